//! AST node definitions for the C++-like front end.
//!
//! Every node kind lives in its own dense-index [`Pool`] inside
//! [`AstArena`]; cross-references between nodes (a field's type, a call's
//! callee, a base class's type) are [`Id`] handles into the relevant pool,
//! never borrowed references. This lets the [`InstantiationEngine`] append
//! freshly-substituted nodes (an instantiated struct, a re-parsed
//! out-of-line method body) to the same arena the original declaration
//! lives in without fighting the borrow checker over self-referential
//! structures.
//!
//! Identifiers and mangled names are represented as [`StringHandle`] — a
//! bare interned handle minted by the core's `StringInterner` — rather than
//! owned `String`s, so the AST stays cheap to copy and compare.

pub mod arena;
pub use arena::{Id, Pool};

/// An interned identifier or mangled-name handle. Minted by the core's
/// `StringInterner`; the AST only ever stores the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringHandle(pub u32);

/// A stable, dense index into the core's type registry. Defined here
/// rather than in `cpp-core` so that `TypeNode::Resolved` (the
/// post-substitution "this names a concrete registry entry" node) can
/// reference it without an upward dependency from this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(pub u32);

pub type TypeId = Id<TypeNode>;
pub type ExprId = Id<Expr>;
pub type StmtId = Id<Stmt>;
pub type BlockId = Id<Block>;
pub type StructId = Id<StructDecl>;
pub type FunctionId = Id<FunctionDecl>;
pub type TemplateParamId = Id<TemplateParam>;
pub type ItemId = Id<Item>;
pub type FieldId = Id<FieldDecl>;
pub type ParamId = Id<ParamDecl>;

/// Owns every AST node pool for one translation unit.
#[derive(Debug, Default)]
pub struct AstArena {
    pub types: Pool<TypeNode>,
    pub exprs: Pool<Expr>,
    pub stmts: Pool<Stmt>,
    pub blocks: Pool<Block>,
    pub structs: Pool<StructDecl>,
    pub functions: Pool<FunctionDecl>,
    pub template_params: Pool<TemplateParam>,
    pub items: Pool<Item>,
    pub fields: Pool<FieldDecl>,
    pub params: Pool<ParamDecl>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_type(&mut self, node: TypeNode) -> TypeId {
        self.types.alloc(node)
    }
    pub fn alloc_expr(&mut self, node: Expr) -> ExprId {
        self.exprs.alloc(node)
    }
    pub fn alloc_stmt(&mut self, node: Stmt) -> StmtId {
        self.stmts.alloc(node)
    }
    pub fn alloc_block(&mut self, node: Block) -> BlockId {
        self.blocks.alloc(node)
    }
    pub fn alloc_struct(&mut self, node: StructDecl) -> StructId {
        self.structs.alloc(node)
    }
    pub fn alloc_function(&mut self, node: FunctionDecl) -> FunctionId {
        self.functions.alloc(node)
    }
    pub fn alloc_template_param(&mut self, node: TemplateParam) -> TemplateParamId {
        self.template_params.alloc(node)
    }
    pub fn alloc_item(&mut self, node: Item) -> ItemId {
        self.items.alloc(node)
    }
    pub fn alloc_field(&mut self, node: FieldDecl) -> FieldId {
        self.fields.alloc(node)
    }
    pub fn alloc_param(&mut self, node: ParamDecl) -> ParamId {
        self.params.alloc(node)
    }

    pub fn ty(&self, id: TypeId) -> &TypeNode {
        self.types.get(id)
    }
    pub fn expr(&self, id: ExprId) -> &Expr {
        self.exprs.get(id)
    }
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        self.stmts.get(id)
    }
    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks.get(id)
    }
    pub fn strukt(&self, id: StructId) -> &StructDecl {
        self.structs.get(id)
    }
    pub fn function(&self, id: FunctionId) -> &FunctionDecl {
        self.functions.get(id)
    }
    pub fn template_param(&self, id: TemplateParamId) -> &TemplateParam {
        self.template_params.get(id)
    }
    pub fn field(&self, id: FieldId) -> &FieldDecl {
        self.fields.get(id)
    }
    pub fn param(&self, id: ParamId) -> &ParamDecl {
        self.params.get(id)
    }
}

/// Root of a translation unit.
#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<ItemId>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Namespace {
        name: StringHandle,
        items: Vec<ItemId>,
    },
    Struct(StructId),
    Function(FunctionId),
    TypeAlias {
        name: StringHandle,
        type_params: Vec<TemplateParamId>,
        target: TypeId,
    },
    /// An alias template, e.g. `template<class T> using void_t = void;`.
    /// Distinguished from a plain `TypeAlias` so §4.5's SFINAE-default-fill
    /// path can special-case alias targets that reduce to `void`.
    AliasTemplate {
        name: StringHandle,
        type_params: Vec<TemplateParamId>,
        target: TypeId,
    },
    Concept {
        name: StringHandle,
        type_params: Vec<TemplateParamId>,
        constraint: ExprId,
    },
    StaticAssert(StaticAssertDecl),
    UsingNamespace(StringHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Cpp,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvQualifier {
    None,
    Const,
    Volatile,
    ConstVolatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefQualifier {
    None,
    LValue,
    RValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructFlags {
    pub is_union: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    /// `#pragma pack(N)`-style override; `None` means natural alignment.
    pub pack_alignment: Option<u32>,
}

impl Default for StructFlags {
    fn default() -> Self {
        Self {
            is_union: false,
            is_abstract: false,
            is_final: false,
            pack_alignment: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BaseSpec {
    pub ty: TypeId,
    pub access: Access,
    pub is_virtual: bool,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: StringHandle,
    pub type_params: Vec<TemplateParamId>,
    pub bases: Vec<BaseSpec>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<FunctionId>,
    pub nested_classes: Vec<StructId>,
    pub static_asserts: Vec<StaticAssertDecl>,
    pub type_aliases: Vec<(StringHandle, TypeId)>,
    pub flags: StructFlags,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    /// `None` for an anonymous union member.
    pub name: Option<StringHandle>,
    pub ty: TypeId,
    pub access: Access,
    pub is_static: bool,
    /// Declared width expression for a bitfield member, e.g. `u32 flags : 3;`.
    /// `: 0` is the force-alignment sentinel (§4.2).
    pub bitfield_width: Option<ExprId>,
    pub default_initializer: Option<ExprId>,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamDecl {
    pub name: StringHandle,
    pub ty: TypeId,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionFlags {
    pub is_virtual: bool,
    pub is_pure_virtual: bool,
    pub is_override: bool,
    pub is_final: bool,
    pub is_const_method: bool,
    pub is_constructor: bool,
    pub is_destructor: bool,
    pub is_operator_overload: bool,
    pub is_variadic: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Receiver {
    pub is_mutable: bool,
    pub is_pointer: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: StringHandle,
    /// Struct this method belongs to, if any. Per the adopted resolution of
    /// the open question in spec §9, this always names the *pattern's*
    /// struct while it is still unattached to an instantiation; mangling
    /// and diagnostics must use the instantiation's qualified name instead
    /// once the function is attached to a concrete `TypeIndex`.
    pub parent_struct: Option<StringHandle>,
    pub type_params: Vec<TemplateParamId>,
    pub where_clause: Vec<(StringHandle, Vec<StringHandle>)>,
    pub receiver: Option<Receiver>,
    pub params: Vec<ParamId>,
    pub return_type: Option<TypeId>,
    pub body: Option<BlockId>,
    pub access: Access,
    pub linkage: Linkage,
    pub flags: FunctionFlags,
    pub vtable_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateParamKind {
    Type,
    NonType(TypeId),
    Template,
}

#[derive(Debug, Clone, Copy)]
pub enum TemplateParamDefault {
    Type(TypeId),
    Value(ExprId),
}

#[derive(Debug, Clone)]
pub struct TemplateParam {
    pub name: StringHandle,
    pub kind: TemplateParamKind,
    pub is_variadic: bool,
    pub default: Option<TemplateParamDefault>,
}

/// An argument in a template-id as written in source, e.g. the `int` and
/// `N + 1` in `Array<int, N + 1>`. Distinct from the core's
/// `TemplateArgument` (§3), which is the *resolved* form after
/// substitution; this is the pre-substitution AST shape.
#[derive(Debug, Clone)]
pub enum TemplateArgNode {
    Type(TypeId),
    Expr(ExprId),
    /// An already-expanded pack, e.g. forwarding `Tail...` verbatim.
    Pack(Vec<TemplateArgNode>),
}

#[derive(Debug, Clone)]
pub enum TypeNode {
    Void,
    Bool,
    Char,
    Int { bits: u16, signed: bool },
    Float { bits: u16 },
    NullptrT,
    Auto,
    Never,
    /// A resolved or still-to-resolve named type (struct/enum/typedef).
    Named(StringHandle),
    Pointer(TypeId, CvQualifier),
    Reference(TypeId, RefQualifier),
    Array(TypeId, Option<ExprId>),
    Function {
        params: Vec<TypeId>,
        return_type: TypeId,
        variadic: bool,
    },
    /// A template-id, e.g. `Tuple<int, float, char>` or `Vector<T>` while T
    /// is still a template parameter.
    TemplateId {
        name: StringHandle,
        args: Vec<TemplateArgNode>,
    },
    /// Reference to an enclosing template's type parameter, `T`.
    TemplateParamRef(StringHandle),
    Decltype(ExprId),
    /// `BaseTemplate<Args>::member`, a dependent qualified name that
    /// requires instantiating `BaseTemplate<Args>` to resolve.
    Qualified { base: TypeId, member: StringHandle },
    /// `T...` in a parameter-pack type position.
    PackExpansion(TypeId),
    /// A concrete, already-resolved registry entry. Produced only by the
    /// substitutor; never appears in a freshly parsed AST.
    Resolved(TypeIndex),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<StmtId>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(ExprId),
    Decl {
        name: StringHandle,
        ty: Option<TypeId>,
        init: Option<ExprId>,
    },
    Return(Option<ExprId>),
    If {
        condition: ExprId,
        then_block: BlockId,
        else_block: Option<BlockId>,
    },
    While {
        condition: ExprId,
        body: BlockId,
    },
    For {
        init: Option<StmtId>,
        condition: Option<ExprId>,
        post: Option<StmtId>,
        body: BlockId,
    },
    Break,
    Continue,
    Block(BlockId),
    StaticAssert(StaticAssertDecl),
}

#[derive(Debug, Clone)]
pub struct StaticAssertDecl {
    pub condition: ExprId,
    pub message: Option<StringHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Static,
    Const,
    Reinterpret,
    Dynamic,
    CStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    ByReference,
    ByValue,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureSpec {
    pub name: StringHandle,
    pub mode: CaptureMode,
}

#[derive(Debug, Clone)]
pub enum SizeofArg {
    Type(TypeId),
    Expr(ExprId),
    /// `sizeof...(P)`: the cardinality of pack parameter `P`.
    PackCardinality(StringHandle),
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    StringLiteral(StringHandle),
    NullptrLiteral,
    Ident(StringHandle),
    This,
    /// Reference to an enclosing template's non-type parameter, used in
    /// default-member-initializer and bitfield-width expressions.
    TemplateParamRef(StringHandle),
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Call {
        callee: ExprId,
        type_args: Vec<TemplateArgNode>,
        args: Vec<ExprId>,
    },
    MethodCall {
        object: ExprId,
        method: StringHandle,
        type_args: Vec<TemplateArgNode>,
        args: Vec<ExprId>,
    },
    MemberAccess {
        object: ExprId,
        member: StringHandle,
        arrow: bool,
    },
    Subscript {
        object: ExprId,
        index: ExprId,
    },
    Cast {
        kind: CastKind,
        target: TypeId,
        operand: ExprId,
    },
    Sizeof(SizeofArg),
    Alignof(TypeId),
    Offsetof {
        ty: TypeId,
        member: StringHandle,
    },
    TypeTrait {
        trait_name: StringHandle,
        type_args: Vec<TypeId>,
    },
    New {
        ty: TypeId,
        array_size: Option<ExprId>,
        placement: Option<ExprId>,
        ctor_args: Vec<ExprId>,
    },
    Delete {
        operand: ExprId,
        is_array: bool,
    },
    AddressOf(ExprId),
    Deref(ExprId),
    Ternary {
        condition: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
    },
    /// `(pack OP ...)` or `(init OP ... OP pack)` fold expression.
    FoldExpr {
        op: BinaryOp,
        pack: StringHandle,
        init: Option<ExprId>,
        /// true for `(init OP ... OP pack)` (left fold with explicit init).
        is_left_fold: bool,
    },
    /// A trailing `expr...` pack expansion inside an argument list,
    /// base-class list, or initializer list.
    PackExpansion(ExprId),
    /// `BaseTemplate<Args>::member` used as a value (e.g. a static data
    /// member or enumerator), requiring instantiation of the outer
    /// template to resolve.
    QualifiedDependentName {
        base: TypeId,
        member: StringHandle,
    },
    Lambda {
        captures: Vec<CaptureSpec>,
        params: Vec<ParamId>,
        return_type: Option<TypeId>,
        body: BlockId,
    },
    Typeid(TypeId),
}

impl TypeNode {
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeNode::Reference(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_ids_are_stable_and_dense() {
        let mut arena = AstArena::new();
        let t1 = arena.alloc_type(TypeNode::Bool);
        let t2 = arena.alloc_type(TypeNode::Int { bits: 32, signed: true });
        assert_ne!(t1, t2);
        assert!(matches!(arena.ty(t1), TypeNode::Bool));
        assert!(matches!(arena.ty(t2), TypeNode::Int { bits: 32, signed: true }));
        assert_eq!(arena.types.len(), 2);
    }

    #[test]
    fn struct_decl_references_fields_and_methods_by_id() {
        let mut arena = AstArena::new();
        let field_ty = arena.alloc_type(TypeNode::Int { bits: 32, signed: true });
        let field = arena.alloc_field(FieldDecl {
            name: Some(StringHandle(1)),
            ty: field_ty,
            access: Access::Public,
            is_static: false,
            bitfield_width: None,
            default_initializer: None,
        });
        let strukt = arena.alloc_struct(StructDecl {
            name: StringHandle(0),
            type_params: vec![],
            bases: vec![],
            fields: vec![field],
            methods: vec![],
            nested_classes: vec![],
            static_asserts: vec![],
            type_aliases: vec![],
            flags: StructFlags::default(),
        });
        assert_eq!(arena.strukt(strukt).fields.len(), 1);
    }
}
