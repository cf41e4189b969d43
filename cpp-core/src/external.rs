//! Trait interfaces for collaborators the core consumes but does not own
//! (spec §6): the lexer, the symbol table, the parser driver, and the
//! constant-expression evaluator. Each is modeled as a Rust trait with no
//! core-owned implementation beyond a minimal in-memory test double,
//! kept under `#[cfg(test)]`.

use cpp_ast::{BlockId, ExprId, StringHandle, StructId};

/// A saved position in the token stream, used to re-parse an out-of-line
/// member-function body once its owning template is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerPosition(pub usize);

pub trait Lexer {
    fn save_position(&self) -> LexerPosition;
    fn restore_position(&mut self, pos: LexerPosition);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Namespace,
    Struct,
    Function,
    Block,
}

/// Consumed symbol-table API (spec §6). `Ast` is left generic: the core
/// only ever inserts/looks up struct and function declarations, so callers
/// parameterize over whatever sum type their symbol table stores.
pub trait SymbolTable<Ast> {
    fn enter_scope(&mut self, kind: ScopeKind);
    fn exit_scope(&mut self);
    fn insert(&mut self, name: StringHandle, ast: Ast);
    fn lookup(&self, name: StringHandle) -> Option<&Ast>;
    fn lookup_all(&self, name: StringHandle) -> &[Ast];
    fn current_namespace_handle(&self) -> StringHandle;
}

/// Minimal parser-driver surface the instantiation engine calls back into
/// for deferred (out-of-line) bodies.
pub trait ParserDriver {
    fn parse_struct_declaration(&mut self) -> StructId;
    fn parse_block(&mut self) -> BlockId;
    fn parse_delayed_function_body(&mut self, saved: LexerPosition) -> BlockId;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    Int(i64),
    Float(f64),
    Bool(bool),
    Failed(String),
}

/// Evaluation context threaded through `ConstExprEvaluator::evaluate`
/// (sizeof/alignof, default non-type arguments, bitfield widths, array
/// dimensions, static_assert conditions, fold-expression reduction).
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationContext {
    pub in_static_assert: bool,
}

pub trait ConstExprEvaluator {
    fn evaluate(&self, expr: ExprId, ctx: EvaluationContext) -> EvalResult;
}

/// ABI-specific knobs the lowering/mangling layer needs but which the core
/// itself does not decide (spec §9 open question 3: pluggable instead of a
/// scattered `isLLP64()` conditional).
pub trait AbiDescriptor {
    fn pointer_width_bits(&self) -> u32;
    /// Structs larger than this many bits are returned via a hidden
    /// pointer argument rather than in registers.
    fn struct_return_threshold_bits(&self) -> u32;
}

#[derive(Debug, Clone, Copy)]
pub enum Abi {
    /// x86-64 System V: 64-bit pointers, 128-bit (two-register) struct
    /// return threshold.
    SysVLp64,
    /// Windows x64: 64-bit pointers, single-register (64-bit) struct
    /// return threshold.
    Llp64,
}

impl AbiDescriptor for Abi {
    fn pointer_width_bits(&self) -> u32 {
        64
    }

    fn struct_return_threshold_bits(&self) -> u32 {
        match self {
            Abi::SysVLp64 => 128,
            Abi::Llp64 => 64,
        }
    }
}
