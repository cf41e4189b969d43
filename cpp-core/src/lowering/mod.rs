//! `ExpressionLowering` (spec §4.7): translates expression AST nodes to the
//! flat IR, enforcing value-category rules and routing calls through the
//! [`overload`] resolver and [`mangle`]'s name mangler.
//!
//! Statement lowering (and therefore function bodies, `if`/`while` control
//! flow, and local-variable declarations) is out of this module's scope —
//! the flat opcode set this crate models has no branch/label instructions,
//! matching the decision already made at instantiation time that a
//! substituted method body is carried through unparsed (see
//! `instantiation::class_template::instantiate_member_function`). What
//! *is* implemented here is every standalone expression kind the core
//! spec names: calls, member access, subscripts, casts,
//! sizeof/alignof/offsetof, type traits, and `new`/`delete`.

pub mod mangle;
pub mod overload;

pub use mangle::NameMangler;
pub use overload::{ArgumentDescriptor, OverloadCandidateSource, OverloadResolver};

use crate::context::CompilationContext;
use crate::errors::{CoreError, CoreResult};
use crate::ir::{IrBuilder, IrPayload, Opcode, TempVar, TypedValue};
use crate::types::{QualifiedType, TypeIndex, TypeKind};
use crate::value_category::{LValueBase, LValueInfo, LValueKind, ValueCategory, ValueCategoryTracker};
use cpp_ast::{
    AstArena, BinaryOp, CastKind, Expr, ExprId, RefQualifier, SizeofArg, StringHandle, TypeId, TypeNode, UnaryOp,
};
use cpp_diagnostics::{Diagnostic, Span};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Load,
    LValueAddress,
}

/// Owns one function body's IR stream and value-category table while it is
/// being lowered (spec §5: both are freed on function exit).
pub struct FunctionLowering<'a, S: OverloadCandidateSource> {
    ctx: &'a mut CompilationContext,
    ast: &'a mut AstArena,
    source: &'a S,
    current_struct: Option<TypeIndex>,
    locals: HashMap<StringHandle, QualifiedType>,
    /// Declared extents of a fixed-size multidimensional array local, e.g.
    /// `int a[3][4][5]` records `[3, 4, 5]` here so a chain of `Subscript`
    /// nodes can be flattened to a single row-major `ArrayAccess`.
    array_dims: HashMap<StringHandle, Vec<u64>>,
    ir: IrBuilder,
    categories: ValueCategoryTracker,
}

impl<'a, S: OverloadCandidateSource> FunctionLowering<'a, S> {
    pub fn new(ctx: &'a mut CompilationContext, ast: &'a mut AstArena, source: &'a S, current_struct: Option<TypeIndex>) -> Self {
        Self {
            ctx,
            ast,
            source,
            current_struct,
            locals: HashMap::new(),
            array_dims: HashMap::new(),
            ir: IrBuilder::new(),
            categories: ValueCategoryTracker::new(),
        }
    }

    /// Registers a parameter or local's resolved type so `Ident` lookups
    /// can find it. The caller seeds this from the function's `ParamDecl`
    /// list before lowering the body's expressions.
    pub fn bind_local(&mut self, name: StringHandle, ty: QualifiedType) {
        self.locals.insert(name, ty);
    }

    /// Registers a fixed-size multidimensional array local: `element_ty` is
    /// the element type, `dims` its declared extents outermost-first.
    pub fn bind_array_local(&mut self, name: StringHandle, element_ty: QualifiedType, dims: Vec<u64>) {
        self.locals.insert(name, element_ty);
        self.array_dims.insert(name, dims);
    }

    pub fn into_parts(self) -> (IrBuilder, ValueCategoryTracker) {
        (self.ir, self.categories)
    }

    pub fn ir(&self) -> &IrBuilder {
        &self.ir
    }

    pub fn categories(&self) -> &ValueCategoryTracker {
        &self.categories
    }

    pub fn lower_expression(&mut self, expr: ExprId, mode: EvalMode) -> CoreResult<TypedValue> {
        match self.ast.expr(expr).clone() {
            Expr::IntLiteral(v) => Ok(self.load_immediate(v, self.ctx.prelude.i32, 0)),
            Expr::BoolLiteral(v) => Ok(self.load_immediate(v as i64, self.ctx.prelude.bool_, 0)),
            Expr::NullptrLiteral => Ok(self.load_immediate(0, self.ctx.prelude.nullptr_t, 0)),
            Expr::FloatLiteral(v) => {
                let ty = self.builtin_float(64);
                Ok(self.load_immediate(v.to_bits() as i64, ty, 0))
            }
            Expr::StringLiteral(handle) => {
                let char_ty = self.builtin_char();
                let var = self.ir.add_instruction(
                    Opcode::GlobalLoad,
                    IrPayload { name_operand: Some(handle), ..Default::default() },
                    Span::unknown(),
                );
                self.categories.record_prvalue(var, char_ty, 8);
                Ok(TypedValue { var, type_index: char_ty, pointer_depth: 1 })
            }
            Expr::Ident(name) => self.lower_ident(name, mode),
            Expr::This => {
                let owner = self.current_struct.ok_or_else(|| {
                    CoreError::InternalInvariant("`this` used outside a member function".to_string())
                })?;
                let var = self.ir.add_instruction(Opcode::LoadLocal, IrPayload::default(), Span::unknown());
                self.categories.record_prvalue(var, owner, 64);
                Ok(TypedValue { var, type_index: owner, pointer_depth: 1 })
            }
            Expr::TemplateParamRef(_) | Expr::PackExpansion(_) | Expr::QualifiedDependentName { .. } => {
                Err(CoreError::InternalInvariant(
                    "template-dependent expression reached lowering unsubstituted".to_string(),
                ))
            }
            Expr::FoldExpr { .. } => Err(CoreError::InternalInvariant(
                "fold expression reached lowering unreduced".to_string(),
            )),
            Expr::Binary { op, lhs, rhs } => self.lower_binary(op, lhs, rhs),
            Expr::Unary { op, operand } => self.lower_unary(op, operand),
            Expr::MemberAccess { object, member, arrow } => self.lower_member_access(object, member, arrow, mode),
            Expr::Subscript { object, index } => {
                if let Some((base_name, indices)) = self.flatten_subscript_chain(expr) {
                    if let Some(dims) = self.array_dims.get(&base_name).cloned() {
                        if dims.len() == indices.len() {
                            return self.lower_flat_array_access(base_name, &dims, &indices, mode);
                        }
                    }
                }
                self.lower_subscript(object, index, mode)
            }
            Expr::Cast { kind, target, operand } => self.lower_cast(kind, target, operand),
            Expr::Sizeof(arg) => self.lower_sizeof(arg),
            Expr::Alignof(ty) => {
                let idx = self.resolve_type_index(ty)?;
                let alignment = self.ctx.types.get(idx).map(|t| t.alignment as i64).unwrap_or(1);
                let size_ty = self.builtin_size_t();
                Ok(self.load_immediate(alignment, size_ty, 0))
            }
            Expr::Offsetof { ty, member } => self.lower_offsetof(ty, member),
            Expr::TypeTrait { trait_name, type_args } => self.lower_type_trait(trait_name, type_args),
            Expr::New { ty, array_size, placement, ctor_args } => self.lower_new(ty, array_size, placement, ctor_args),
            Expr::Delete { operand, is_array } => self.lower_delete(operand, is_array),
            Expr::AddressOf(inner) => self.lower_address_of(inner),
            Expr::Deref(inner) => self.lower_deref(inner, mode),
            Expr::Call { callee, args, .. } => self.lower_call(callee, args),
            Expr::MethodCall { object, method, args, .. } => self.lower_method_call(object, method, args),
            Expr::Ternary { .. } => Err(CoreError::InternalInvariant(
                "ternary lowering requires branch instructions this flat opcode set does not model".to_string(),
            )),
            Expr::Lambda { .. } => Err(CoreError::InternalInvariant(
                "lambda lowering requires closure-type synthesis not yet implemented".to_string(),
            )),
            Expr::Typeid(ty) => {
                let idx = self.resolve_type_index(ty)?;
                let type_info_ty = self.builtin_named("__type_info", TypeKind::UserDefined, 0);
                let var = self.ir.add_instruction(
                    Opcode::Typeid,
                    IrPayload { type_operand: Some(idx), ..Default::default() },
                    Span::unknown(),
                );
                self.categories.record_prvalue(var, type_info_ty, 64);
                Ok(TypedValue { var, type_index: type_info_ty, pointer_depth: 0 })
            }
        }
    }

    fn load_immediate(&mut self, value: i64, ty: TypeIndex, pointer_depth: u8) -> TypedValue {
        let var = self.ir.add_instruction(
            Opcode::LoadImmediate,
            IrPayload { int_operand: Some(value), ..Default::default() },
            Span::unknown(),
        );
        let bits = self.ctx.types.get(ty).map(|t| t.size_in_bits).unwrap_or(0);
        self.categories.record_prvalue(var, ty, bits);
        TypedValue { var, type_index: ty, pointer_depth }
    }

    fn lower_ident(&mut self, name: StringHandle, mode: EvalMode) -> CoreResult<TypedValue> {
        let qt = *self.locals.get(&name).ok_or_else(|| CoreError::UnresolvedName {
            name: self.ctx.interner.resolve(name).unwrap_or_else(|| format!("T{}", name.0)),
        })?;
        let info = LValueInfo::direct(name);
        match mode {
            EvalMode::LValueAddress => {
                let var = self.ir.next_temp_var();
                self.categories.record_lvalue(var, info, qt.base, self.bit_size_of(qt));
                Ok(TypedValue { var, type_index: qt.base, pointer_depth: qt.pointer_depth })
            }
            EvalMode::Load => {
                let var = self.ir.add_instruction(
                    Opcode::LoadLocal,
                    IrPayload { name_operand: Some(name), ..Default::default() },
                    Span::unknown(),
                );
                self.categories.record_prvalue(var, qt.base, self.bit_size_of(qt));
                Ok(TypedValue { var, type_index: qt.base, pointer_depth: qt.pointer_depth })
            }
        }
    }

    fn bit_size_of(&self, qt: QualifiedType) -> u64 {
        if qt.pointer_depth > 0 || qt.reference != RefQualifier::None {
            return 64;
        }
        self.ctx.types.get(qt.base).map(|t| t.size_in_bits).unwrap_or(0)
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> CoreResult<TypedValue> {
        let l = self.lower_expression(lhs, EvalMode::Load)?;
        let r = self.lower_expression(rhs, EvalMode::Load)?;
        let is_float = matches!(self.ctx.types.get(l.type_index).map(|t| t.kind), Some(TypeKind::Float { .. }));
        let opcode = binary_opcode(op, is_float);
        let var = self.ir.add_instruction(opcode, IrPayload::binary(l.var, r.var), Span::unknown());
        let result_ty = match op {
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::LogicalAnd
            | BinaryOp::LogicalOr => self.ctx.prelude.bool_,
            _ => l.type_index,
        };
        let bits = self.ctx.types.get(result_ty).map(|t| t.size_in_bits).unwrap_or(0);
        self.categories.record_prvalue(var, result_ty, bits);
        Ok(TypedValue { var, type_index: result_ty, pointer_depth: 0 })
    }

    /// `!x` lowers to `x == 0`; `-x` to `0 - x`; `~x` to `x ^ -1` — all
    /// expressible with the existing binary opcodes rather than adding
    /// unary-specific ones.
    fn lower_unary(&mut self, op: UnaryOp, operand: ExprId) -> CoreResult<TypedValue> {
        let v = self.lower_expression(operand, EvalMode::Load)?;
        let (opcode, immediate) = match op {
            UnaryOp::Neg => (Opcode::Subtract, 0i64),
            UnaryOp::Not => (Opcode::Equal, 0i64),
            UnaryOp::BitNot => (Opcode::BitXor, -1i64),
        };
        let imm = self.load_immediate(immediate, v.type_index, 0);
        let (lhs, rhs) = match op {
            UnaryOp::Neg => (imm.var, v.var),
            _ => (v.var, imm.var),
        };
        let var = self.ir.add_instruction(opcode, IrPayload::binary(lhs, rhs), Span::unknown());
        let result_ty = if matches!(op, UnaryOp::Not) { self.ctx.prelude.bool_ } else { v.type_index };
        let bits = self.ctx.types.get(result_ty).map(|t| t.size_in_bits).unwrap_or(0);
        self.categories.record_prvalue(var, result_ty, bits);
        Ok(TypedValue { var, type_index: result_ty, pointer_depth: 0 })
    }

    /// `obj.m` / `obj->m` (spec: "resolve `operator->` overloads... for
    /// static members emit `GlobalLoad`... for instance members emit
    /// `MemberAccess` with object base, member name, byte offset").
    fn lower_member_access(
        &mut self,
        object: ExprId,
        member: StringHandle,
        _arrow: bool,
        mode: EvalMode,
    ) -> CoreResult<TypedValue> {
        let obj = self.lower_expression(object, EvalMode::LValueAddress)?;
        let struct_info = self
            .ctx
            .types
            .get(obj.type_index)
            .and_then(|t| t.struct_info.as_ref())
            .ok_or_else(|| CoreError::UnresolvedName {
                name: self.ctx.interner.resolve(member).unwrap_or_else(|| format!("T{}", member.0)),
            })?;

        if let Some(static_member) = struct_info.static_members.iter().find(|m| m.name == member) {
            let ty = static_member.type_index;
            let var = self.ir.add_instruction(
                Opcode::GlobalLoad,
                IrPayload { name_operand: Some(member), ..Default::default() },
                Span::unknown(),
            );
            let bits = self.ctx.types.get(ty).map(|t| t.size_in_bits).unwrap_or(0);
            self.categories.record_prvalue(var, ty, bits);
            return Ok(TypedValue { var, type_index: ty, pointer_depth: 0 });
        }

        let field = struct_info
            .members
            .iter()
            .find(|m| m.name == Some(member))
            .ok_or_else(|| CoreError::UnresolvedName {
                name: self.ctx.interner.resolve(member).unwrap_or_else(|| format!("T{}", member.0)),
            })?;
        let mut info = LValueInfo::member(LValueBase::Temp(obj.var), field.offset, member);
        if let Some(width) = field.bitfield_width {
            info = info.with_bitfield(width, field.bitfield_bit_offset.unwrap_or(0));
        }
        let field_ty = field.type_index;
        let field_bits = field.byte_size * 8;

        match mode {
            EvalMode::LValueAddress => {
                let var = self.ir.next_temp_var();
                self.categories.record_lvalue(var, info, field_ty, field_bits);
                Ok(TypedValue { var, type_index: field_ty, pointer_depth: 0 })
            }
            EvalMode::Load => {
                let var = self.ir.add_instruction(
                    Opcode::MemberAccess,
                    IrPayload {
                        operands: vec![obj.var],
                        name_operand: Some(member),
                        byte_offset: Some(info.byte_offset),
                        bitfield: info.bitfield,
                        ..Default::default()
                    },
                    Span::unknown(),
                );
                info.kind = LValueKind::Member;
                self.categories.record_lvalue(var, info, field_ty, field_bits);
                Ok(TypedValue { var, type_index: field_ty, pointer_depth: 0 })
            }
        }
    }

    /// `a[i]` (spec: "multidimensional `a[i][j]...[k]`... flatten to a
    /// single index"). Single-dimension subscript only — nested
    /// `Subscript` chains are not yet flattened via declared dimensions.
    fn lower_subscript(&mut self, object: ExprId, index: ExprId, mode: EvalMode) -> CoreResult<TypedValue> {
        let obj = self.lower_expression(object, EvalMode::LValueAddress)?;
        let idx = self.lower_expression(index, EvalMode::Load)?;
        let info = LValueInfo::array_element(LValueBase::Temp(obj.var), idx.var);
        let element_ty = obj.type_index;
        let element_bits = self.ctx.types.get(element_ty).map(|t| t.size_in_bits).unwrap_or(0);
        match mode {
            EvalMode::LValueAddress => {
                let var = self.ir.next_temp_var();
                self.categories.record_lvalue(var, info, element_ty, element_bits);
                Ok(TypedValue { var, type_index: element_ty, pointer_depth: 0 })
            }
            EvalMode::Load => {
                let var =
                    self.ir.add_instruction(Opcode::ArrayAccess, IrPayload::binary(obj.var, idx.var), Span::unknown());
                self.categories.record_lvalue(var, info, element_ty, element_bits);
                Ok(TypedValue { var, type_index: element_ty, pointer_depth: 0 })
            }
        }
    }

    /// Walks a chain of nested `Subscript` nodes back to their common
    /// `Ident` base, returning the base name and the per-level index
    /// expressions in declaration order (outermost dimension first).
    /// Returns `None` if the chain does not bottom out in a plain name
    /// (e.g. `f()[i]` or `p[i][j]` through a pointer rather than a
    /// declared array).
    fn flatten_subscript_chain(&self, expr: ExprId) -> Option<(StringHandle, Vec<ExprId>)> {
        let mut indices = Vec::new();
        let mut current = expr;
        loop {
            match self.ast.expr(current).clone() {
                Expr::Subscript { object, index } => {
                    indices.push(index);
                    current = object;
                }
                Expr::Ident(name) => {
                    indices.reverse();
                    return Some((name, indices));
                }
                _ => return None,
            }
        }
    }

    /// `a[i][j]...[k]` over a declared fixed-size array lowers to exactly
    /// one `ArrayAccess` with the row-major flattened index
    /// `i*dims[1]*..*dims[n-1] + j*dims[2]*..*dims[n-1] + ... + k`.
    fn lower_flat_array_access(
        &mut self,
        base: StringHandle,
        dims: &[u64],
        indices: &[ExprId],
        mode: EvalMode,
    ) -> CoreResult<TypedValue> {
        let element_qt = *self.locals.get(&base).ok_or_else(|| {
            CoreError::UnresolvedName { name: self.ctx.interner.resolve(base).unwrap_or_else(|| format!("T{}", base.0)) }
        })?;

        let mut flat_var: Option<TempVar> = None;
        for (level, &idx_expr) in indices.iter().enumerate() {
            let idx_val = self.lower_expression(idx_expr, EvalMode::Load)?;
            let multiplier: u64 = dims[level + 1..].iter().product();
            let contribution = if multiplier > 1 {
                let mult_imm = self.load_immediate(multiplier as i64, idx_val.type_index, 0);
                self.ir.add_instruction(Opcode::Multiply, IrPayload::binary(idx_val.var, mult_imm.var), Span::unknown())
            } else {
                idx_val.var
            };
            flat_var = Some(match flat_var {
                None => contribution,
                Some(acc) => self.ir.add_instruction(Opcode::Add, IrPayload::binary(acc, contribution), Span::unknown()),
            });
        }
        let flat_var = flat_var.ok_or_else(|| {
            CoreError::InternalInvariant("array access with no index dimensions".to_string())
        })?;

        let element_ty = element_qt.base;
        let element_bits = self.bit_size_of(element_qt);
        let info = LValueInfo::array_element(LValueBase::Name(base), flat_var);
        match mode {
            EvalMode::LValueAddress => {
                let var = self.ir.next_temp_var();
                self.categories.record_lvalue(var, info, element_ty, element_bits);
                Ok(TypedValue { var, type_index: element_ty, pointer_depth: 0 })
            }
            EvalMode::Load => {
                let base_addr = self.ir.next_temp_var();
                self.categories.record_lvalue(base_addr, LValueInfo::direct(base), element_ty, element_bits);
                let var = self.ir.add_instruction(Opcode::ArrayAccess, IrPayload::binary(base_addr, flat_var), Span::unknown());
                self.categories.record_lvalue(var, info, element_ty, element_bits);
                Ok(TypedValue { var, type_index: element_ty, pointer_depth: 0 })
            }
        }
    }

    fn lower_cast(&mut self, kind: CastKind, target: TypeId, operand: ExprId) -> CoreResult<TypedValue> {
        // A reference-typed cast target wraps its base in `TypeNode::Reference`,
        // which `resolve_type_index` itself never accepts (it only recognizes
        // an already-`Resolved` node) — unwrap to the base before resolving.
        let (target_ref_kind, base_target) = match self.ast.ty(target) {
            TypeNode::Reference(inner, rq) => (Some(*rq), *inner),
            _ => (None, target),
        };
        let is_target_reference = target_ref_kind.is_some();
        let target_idx = self.resolve_type_index(base_target)?;

        match kind {
            CastKind::Const | CastKind::Reinterpret => {
                let source = self.lower_expression(operand, EvalMode::Load)?;
                let var = self.ir.add_instruction(
                    Opcode::TypeConversion,
                    IrPayload { operands: vec![source.var], type_operand: Some(target_idx), ..Default::default() },
                    Span::unknown(),
                );
                let bits = self.ctx.types.get(target_idx).map(|t| t.size_in_bits).unwrap_or(0);
                self.categories.record_prvalue(var, target_idx, bits);
                Ok(TypedValue { var, type_index: target_idx, pointer_depth: source.pointer_depth })
            }
            CastKind::Dynamic => {
                let source = self.lower_expression(operand, EvalMode::Load)?;
                let var = self.ir.add_instruction(
                    Opcode::DynamicCast,
                    IrPayload { operands: vec![source.var], type_operand: Some(target_idx), ..Default::default() },
                    Span::unknown(),
                );
                self.categories.record_prvalue(var, target_idx, 64);
                Ok(TypedValue { var, type_index: target_idx, pointer_depth: 1 })
            }
            CastKind::Static | CastKind::CStyle => {
                if is_target_reference {
                    let source = self.lower_expression(operand, EvalMode::LValueAddress)?;
                    let var = self.ir.next_temp_var();
                    let meta = self.categories.metadata(source.var).copied();
                    match target_ref_kind {
                        Some(RefQualifier::RValue) => {
                            let info = match meta.and_then(|m| m.lvalue_info) {
                                Some(info) => info,
                                None => LValueInfo::direct(StringHandle(u32::MAX)),
                            };
                            self.categories.record_xvalue(var, info, target_idx, self.bit_size_of_index(target_idx));
                        }
                        _ => {
                            let info = match meta.and_then(|m| m.lvalue_info) {
                                Some(info) => info,
                                None => LValueInfo::direct(StringHandle(u32::MAX)),
                            };
                            self.categories.record_lvalue(var, info, target_idx, self.bit_size_of_index(target_idx));
                        }
                    }
                    return Ok(TypedValue { var, type_index: target_idx, pointer_depth: source.pointer_depth });
                }

                let source = self.lower_expression(operand, EvalMode::Load)?;
                let source_kind = self.ctx.types.get(source.type_index).map(|t| t.kind);
                let target_kind = self.ctx.types.get(target_idx).map(|t| t.kind);
                let opcode = match (source_kind, target_kind) {
                    (Some(TypeKind::Float { .. }), Some(TypeKind::Int { .. })) => Some(Opcode::FloatToInt),
                    (Some(TypeKind::Int { .. }), Some(TypeKind::Float { .. })) => Some(Opcode::IntToFloat),
                    (Some(TypeKind::Float { .. }), Some(TypeKind::Float { .. })) => Some(Opcode::FloatToFloat),
                    _ => None,
                };
                let var = if let Some(opcode) = opcode {
                    self.ir.add_instruction(opcode, IrPayload::operand(source.var), Span::unknown())
                } else if matches!(target_kind, Some(TypeKind::Bool)) {
                    // `to bool` lowers to `!= 0`.
                    let zero = self.load_immediate(0, source.type_index, 0);
                    self.ir.add_instruction(Opcode::NotEqual, IrPayload::binary(source.var, zero.var), Span::unknown())
                } else {
                    self.ir.add_instruction(
                        Opcode::TypeConversion,
                        IrPayload { operands: vec![source.var], type_operand: Some(target_idx), ..Default::default() },
                        Span::unknown(),
                    )
                };
                let bits = self.ctx.types.get(target_idx).map(|t| t.size_in_bits).unwrap_or(0);
                self.categories.record_prvalue(var, target_idx, bits);
                Ok(TypedValue { var, type_index: target_idx, pointer_depth: 0 })
            }
        }
    }

    fn bit_size_of_index(&self, idx: TypeIndex) -> u64 {
        self.ctx.types.get(idx).map(|t| t.size_in_bits).unwrap_or(0)
    }

    fn lower_sizeof(&mut self, arg: SizeofArg) -> CoreResult<TypedValue> {
        let bytes = match arg {
            SizeofArg::Type(ty) => {
                let idx = self.resolve_type_index(ty)?;
                (self.ctx.types.get(idx).map(|t| t.size_in_bits).unwrap_or(0) + 7) / 8
            }
            SizeofArg::Expr(e) => {
                // `sizeof(a[0])` yields the element's size: lowering the
                // operand (without emitting a load we'd discard) gives us
                // its static type directly.
                let v = self.lower_expression(e, EvalMode::LValueAddress)?;
                (self.ctx.types.get(v.type_index).map(|t| t.size_in_bits).unwrap_or(0) + 7) / 8
            }
            SizeofArg::PackCardinality(_) => {
                return Err(CoreError::InternalInvariant(
                    "sizeof... should have been reduced during substitution".to_string(),
                ))
            }
        };
        let size_ty = self.builtin_size_t();
        Ok(self.load_immediate(bytes as i64, size_ty, 0))
    }

    fn lower_offsetof(&mut self, ty: TypeId, member: StringHandle) -> CoreResult<TypedValue> {
        let idx = self.resolve_type_index(ty)?;
        let offset = self
            .ctx
            .types
            .get(idx)
            .and_then(|t| t.struct_info.as_ref())
            .and_then(|info| info.members.iter().find(|m| m.name == Some(member)))
            .map(|m| m.offset)
            .ok_or_else(|| CoreError::UnresolvedName {
                name: self.ctx.interner.resolve(member).unwrap_or_else(|| format!("T{}", member.0)),
            })?;
        let size_ty = self.builtin_size_t();
        Ok(self.load_immediate(offset as i64, size_ty, 0))
    }

    /// Each trait reduces to a boolean constant (spec §4.7 "Type traits").
    /// Only the handful with data already on hand (`StructInfo`) are
    /// actually evaluated; anything else defaults to `false` with a
    /// logged warning, exactly as the spec calls out.
    fn lower_type_trait(&mut self, trait_name: StringHandle, type_args: Vec<TypeId>) -> CoreResult<TypedValue> {
        let trait_str = self.ctx.interner.resolve(trait_name).unwrap_or_else(|| format!("T{}", trait_name.0));
        let mut resolved = Vec::with_capacity(type_args.len());
        for ty in &type_args {
            resolved.push(self.resolve_type_index(*ty)?);
        }

        let value = match (trait_str.as_str(), resolved.as_slice()) {
            ("__is_same", [a, b]) => a == b,
            ("__is_base_of", [base, derived]) => self.is_base_of(*base, *derived),
            _ => {
                log::warn!("unimplemented type trait `{}`, defaulting to false", trait_str);
                self.ctx.diagnostics.emit(Diagnostic::warning(
                    "unimplemented-type-trait",
                    format!("`{}` is not implemented and defaults to false", trait_str),
                    Span::unknown(),
                ));
                false
            }
        };
        Ok(self.load_immediate(value as i64, self.ctx.prelude.bool_, 0))
    }

    fn is_base_of(&self, base: TypeIndex, derived: TypeIndex) -> bool {
        if base == derived {
            return true;
        }
        let Some(info) = self.ctx.types.get(derived).and_then(|t| t.struct_info.as_ref()) else { return false };
        info.base_classes.iter().any(|b| self.is_base_of(base, b.type_index))
    }

    fn lower_new(
        &mut self,
        ty: TypeId,
        array_size: Option<ExprId>,
        placement: Option<ExprId>,
        _ctor_args: Vec<ExprId>,
    ) -> CoreResult<TypedValue> {
        let idx = self.resolve_type_index(ty)?;
        let size_bits = self.ctx.types.get(idx).map(|t| t.size_in_bits).unwrap_or(0);
        let size_bytes = (size_bits + 7) / 8;

        let var = if let Some(placement_expr) = placement {
            let addr = self.lower_expression(placement_expr, EvalMode::Load)?;
            self.ir.add_instruction(
                Opcode::PlacementNew,
                IrPayload { operands: vec![addr.var], type_operand: Some(idx), int_operand: Some(size_bytes as i64), ..Default::default() },
                Span::unknown(),
            )
        } else if let Some(count_expr) = array_size {
            let count = self.lower_expression(count_expr, EvalMode::Load)?;
            self.ir.add_instruction(
                Opcode::HeapAllocArray,
                IrPayload { operands: vec![count.var], type_operand: Some(idx), int_operand: Some(size_bytes as i64), ..Default::default() },
                Span::unknown(),
            )
        } else {
            self.ir.add_instruction(
                Opcode::HeapAlloc,
                IrPayload { type_operand: Some(idx), int_operand: Some(size_bytes as i64), ..Default::default() },
                Span::unknown(),
            )
        };

        let has_constructor = self
            .ctx
            .types
            .get(idx)
            .and_then(|t| t.struct_info.as_ref())
            .map(|info| info.member_functions.iter().any(|f| f.is_constructor))
            .unwrap_or(false);
        if has_constructor && array_size.is_none() {
            self.ir.add_void_instruction(Opcode::ConstructorCall, IrPayload::operand(var), Span::unknown());
        }

        self.categories.record_prvalue(var, idx, size_bits);
        Ok(TypedValue { var, type_index: idx, pointer_depth: 1 })
    }

    fn lower_delete(&mut self, operand: ExprId, is_array: bool) -> CoreResult<TypedValue> {
        let ptr = self.lower_expression(operand, EvalMode::Load)?;
        let opcode = if is_array { Opcode::HeapFreeArray } else { Opcode::HeapFree };
        self.ir.add_void_instruction(opcode, IrPayload::operand(ptr.var), Span::unknown());
        let void_ty = self.ctx.prelude.void;
        let var = self.ir.next_temp_var();
        self.categories.record_prvalue(var, void_ty, 0);
        Ok(TypedValue { var, type_index: void_ty, pointer_depth: 0 })
    }

    fn lower_address_of(&mut self, inner: ExprId) -> CoreResult<TypedValue> {
        let v = self.lower_expression(inner, EvalMode::LValueAddress)?;
        let var = self.ir.add_instruction(Opcode::AddressOf, IrPayload::operand(v.var), Span::unknown());
        self.categories.record_prvalue(var, v.type_index, 64);
        Ok(TypedValue { var, type_index: v.type_index, pointer_depth: v.pointer_depth + 1 })
    }

    fn lower_deref(&mut self, inner: ExprId, mode: EvalMode) -> CoreResult<TypedValue> {
        let ptr = self.lower_expression(inner, EvalMode::Load)?;
        let pointee_depth = ptr.pointer_depth.saturating_sub(1);
        let bits = self.ctx.types.get(ptr.type_index).map(|t| t.size_in_bits).unwrap_or(0);
        match mode {
            EvalMode::LValueAddress => {
                let info = LValueInfo::indirect(ptr.var);
                let var = self.ir.next_temp_var();
                self.categories.record_lvalue(var, info, ptr.type_index, bits);
                Ok(TypedValue { var, type_index: ptr.type_index, pointer_depth: pointee_depth })
            }
            EvalMode::Load => {
                let var = self.ir.add_instruction(Opcode::Dereference, IrPayload::operand(ptr.var), Span::unknown());
                self.categories.record_prvalue(var, ptr.type_index, bits);
                Ok(TypedValue { var, type_index: ptr.type_index, pointer_depth: pointee_depth })
            }
        }
    }

    /// An argument expression that is itself lvalue-shaped (a named
    /// variable, a member, a subscript, a dereference) is lowered in
    /// `LValueAddress` mode so its TempVar carries the address via
    /// metadata rather than a materialized copy; overload resolution then
    /// sees its true `LValue` category instead of always `PRValue`, and a
    /// reference parameter receives the address with no separate load.
    fn natural_arg_mode(&self, expr: ExprId) -> EvalMode {
        match self.ast.expr(expr) {
            Expr::Ident(_) | Expr::This | Expr::MemberAccess { .. } | Expr::Subscript { .. } | Expr::Deref(_) => {
                EvalMode::LValueAddress
            }
            _ => EvalMode::Load,
        }
    }

    fn lower_call(&mut self, callee: ExprId, args: Vec<ExprId>) -> CoreResult<TypedValue> {
        let Expr::Ident(name) = self.ast.expr(callee).clone() else {
            return Err(CoreError::InternalInvariant(
                "only direct-name calls are lowered; function pointers and closures are not yet supported".to_string(),
            ));
        };

        let mut arg_values = Vec::with_capacity(args.len());
        let mut descriptors = Vec::with_capacity(args.len());
        for arg in &args {
            let v = self.lower_expression(*arg, self.natural_arg_mode(*arg))?;
            let category = self.categories.category(v.var).unwrap_or(ValueCategory::PRValue);
            descriptors.push(ArgumentDescriptor {
                ty: QualifiedType { base: v.type_index, pointer_depth: v.pointer_depth, cv: cpp_ast::CvQualifier::None, reference: RefQualifier::None },
                category,
            });
            arg_values.push(v);
        }

        let resolver = OverloadResolver::new(self.ctx, self.ast, self.source);
        let callee_id = resolver.resolve(name, &descriptors, self.current_struct, false)?;
        let decl = self.ast.function(callee_id).clone();
        let return_ty = match decl.return_type {
            Some(ty) => self.resolve_type_index(ty)?,
            None => self.ctx.prelude.void,
        };

        let var = self.ir.add_instruction(
            Opcode::FunctionCall,
            IrPayload { operands: arg_values.iter().map(|v| v.var).collect(), name_operand: Some(decl.name), ..Default::default() },
            Span::unknown(),
        );
        let bits = self.ctx.types.get(return_ty).map(|t| t.size_in_bits).unwrap_or(0);
        self.categories.record_prvalue(var, return_ty, bits);
        Ok(TypedValue { var, type_index: return_ty, pointer_depth: 0 })
    }

    fn lower_method_call(&mut self, object: ExprId, method: StringHandle, args: Vec<ExprId>) -> CoreResult<TypedValue> {
        let obj = self.lower_expression(object, EvalMode::LValueAddress)?;

        let mut arg_values = Vec::with_capacity(args.len());
        let mut descriptors = Vec::with_capacity(args.len());
        for arg in &args {
            let v = self.lower_expression(*arg, self.natural_arg_mode(*arg))?;
            let category = self.categories.category(v.var).unwrap_or(ValueCategory::PRValue);
            descriptors.push(ArgumentDescriptor {
                ty: QualifiedType { base: v.type_index, pointer_depth: v.pointer_depth, cv: cpp_ast::CvQualifier::None, reference: RefQualifier::None },
                category,
            });
            arg_values.push(v);
        }

        let resolver = OverloadResolver::new(self.ctx, self.ast, self.source);
        let callee_id = resolver.resolve(method, &descriptors, Some(obj.type_index), false)?;
        let decl = self.ast.function(callee_id).clone();
        let return_ty = match decl.return_type {
            Some(ty) => self.resolve_type_index(ty)?,
            None => self.ctx.prelude.void,
        };

        let member = self
            .ctx
            .types
            .get(obj.type_index)
            .and_then(|t| t.struct_info.as_ref())
            .and_then(|info| info.member_functions.iter().find(|f| f.declaration == callee_id));
        let is_virtual = member.map(|f| f.is_virtual).unwrap_or(false);
        let vtable_index = member.and_then(|f| f.vtable_index);
        let dispatches_virtually = is_virtual && self.receiver_is_indirect(object, &obj);

        let mut params = Vec::with_capacity(decl.params.len());
        for param_id in &decl.params {
            let param_ty = self.ast.param(*param_id).ty;
            let qt = overload::resolve_qualified(self.ast, param_ty).ok_or_else(|| {
                CoreError::InternalInvariant(format!("method parameter type reached mangling unresolved: {:?}", param_ty))
            })?;
            params.push(qt);
        }
        let mangled = NameMangler::mangle(self.ctx, decl.name, &params, decl.flags.is_variadic, decl.parent_struct, &[], decl.linkage);
        let mangled_name = self.ctx.interner.intern(&mangled);

        let mut operands = vec![obj.var];
        operands.extend(arg_values.iter().map(|v| v.var));
        let opcode = if dispatches_virtually { Opcode::VirtualCall } else { Opcode::FunctionCall };
        let payload = if dispatches_virtually {
            IrPayload { operands, name_operand: Some(mangled_name), int_operand: vtable_index.map(|i| i as i64), ..Default::default() }
        } else {
            IrPayload { operands, name_operand: Some(mangled_name), ..Default::default() }
        };
        let var = self.ir.add_instruction(opcode, payload, Span::unknown());
        let bits = self.ctx.types.get(return_ty).map(|t| t.size_in_bits).unwrap_or(0);
        self.categories.record_prvalue(var, return_ty, bits);
        Ok(TypedValue { var, type_index: return_ty, pointer_depth: 0 })
    }

    /// A virtual method only dispatches through the vtable when it is
    /// reached through a pointer or reference; called on a value object it
    /// resolves statically like any other direct call.
    fn receiver_is_indirect(&self, object: ExprId, obj: &TypedValue) -> bool {
        if let Expr::Ident(name) = self.ast.expr(object) {
            if let Some(qt) = self.locals.get(name) {
                return qt.pointer_depth > 0 || qt.reference != RefQualifier::None;
            }
        }
        obj.pointer_depth > 0
    }

    /// Types reaching this lowering stage have already been through
    /// template substitution, so only `Resolved` is a real answer; any
    /// other node means something upstream left a type unsubstituted.
    fn resolve_type_index(&self, ty: TypeId) -> CoreResult<TypeIndex> {
        match self.ast.ty(ty) {
            TypeNode::Resolved(idx) => Ok(*idx),
            other => Err(CoreError::InternalInvariant(format!(
                "type reached lowering unresolved: {:?}",
                other
            ))),
        }
    }

    fn builtin_named(&mut self, name: &str, kind: TypeKind, bits: u64) -> TypeIndex {
        let handle = self.ctx.interner.intern(name);
        match self.ctx.types.find_by_name(handle) {
            Some(idx) => idx,
            None => self.ctx.types.add_type_unchecked(handle, kind, bits),
        }
    }

    fn builtin_float(&mut self, bits: u16) -> TypeIndex {
        self.builtin_named(&format!("float{}_t", bits), TypeKind::Float { bits }, bits as u64)
    }

    fn builtin_char(&mut self) -> TypeIndex {
        self.builtin_named("char", TypeKind::Char, 8)
    }

    fn builtin_size_t(&mut self) -> TypeIndex {
        self.builtin_named("size_t", TypeKind::Int { bits: 64, signed: false }, 64)
    }
}

fn binary_opcode(op: BinaryOp, is_float: bool) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Subtract,
        BinaryOp::Mul => Opcode::Multiply,
        BinaryOp::Div => Opcode::Divide,
        BinaryOp::Mod => Opcode::Modulo,
        BinaryOp::Eq => if is_float { Opcode::FloatEqual } else { Opcode::Equal },
        BinaryOp::NotEq => if is_float { Opcode::FloatNotEqual } else { Opcode::NotEqual },
        BinaryOp::Lt => Opcode::Less,
        BinaryOp::LtEq => Opcode::LessEq,
        BinaryOp::Gt => Opcode::Greater,
        BinaryOp::GtEq => Opcode::GreaterEq,
        BinaryOp::LogicalAnd => Opcode::LogicalAnd,
        BinaryOp::LogicalOr => Opcode::LogicalOr,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitXor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
    }
}
