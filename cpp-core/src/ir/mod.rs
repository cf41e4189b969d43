//! The flat IR instruction stream `ExpressionLowering` emits into (spec
//! §4.7, §6 `IrBuilder`): ordered, append-only, one dense `TempVar` per
//! result.

use crate::types::TypeIndex;
use cpp_ast::StringHandle;
use cpp_diagnostics::Span;

/// A dense, monotonically increasing temporary-value index (spec §9:
/// dense integer indices everywhere, no pointers into growable vectors).
pub type TempVar = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    FunctionCall,
    IndirectCall,
    VirtualCall,
    ConstructorCall,
    DestructorCall,
    MemberAccess,
    ArrayAccess,
    AddressOf,
    Dereference,
    Assignment,
    /// Materializes a compile-time-constant literal (spec §2's opcode list
    /// is introduced with "include", not an exhaustive enumeration; a flat
    /// instruction stream still needs some way to produce a literal's
    /// value before it can be an operand of anything else).
    LoadImmediate,
    /// Reads the current value of a named local/parameter.
    LoadLocal,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    LogicalAnd,
    LogicalOr,
    FloatEqual,
    FloatNotEqual,
    FloatToInt,
    IntToFloat,
    FloatToFloat,
    TypeConversion,
    HeapAlloc,
    HeapAllocArray,
    HeapFree,
    HeapFreeArray,
    PlacementNew,
    Typeid,
    DynamicCast,
    GlobalLoad,
}

/// Deliberately loose bag of operand slots rather than one variant per
/// opcode: `ExpressionLowering` fills in only the fields its opcode needs,
/// and the backend (out of scope here) reads them back out by opcode.
#[derive(Debug, Clone, Default)]
pub struct IrPayload {
    pub operands: Vec<TempVar>,
    pub type_operand: Option<TypeIndex>,
    pub name_operand: Option<StringHandle>,
    pub int_operand: Option<i64>,
    pub byte_offset: Option<u64>,
    pub bitfield: Option<(u32, u32)>,
}

impl IrPayload {
    pub fn operand(var: TempVar) -> Self {
        Self {
            operands: vec![var],
            ..Default::default()
        }
    }

    pub fn binary(lhs: TempVar, rhs: TempVar) -> Self {
        Self {
            operands: vec![lhs, rhs],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct IrInstruction {
    pub opcode: Opcode,
    pub payload: IrPayload,
    /// `None` for opcodes with no result (e.g. `DestructorCall`, `HeapFree`).
    pub result: Option<TempVar>,
    pub source_token: Span,
}

/// A value flowing through lowering: which temporary holds it, and its
/// static type (spec §4.7's `(kind, bit_size, value, extra_index)` tuple,
/// generalized to carry a full `TypeIndex` instead of a bare bit size).
#[derive(Debug, Clone, Copy)]
pub struct TypedValue {
    pub var: TempVar,
    pub type_index: TypeIndex,
    pub pointer_depth: u8,
}

/// Appends instructions in program order and mints fresh `TempVar`s (spec
/// §5 ordering guarantee: "IR instructions are appended in program order").
#[derive(Debug, Default)]
pub struct IrBuilder {
    instructions: Vec<IrInstruction>,
    next_var: TempVar,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction that produces a result, returning its var.
    pub fn add_instruction(&mut self, opcode: Opcode, payload: IrPayload, source_token: Span) -> TempVar {
        let result = self.next_temp_var();
        self.instructions.push(IrInstruction {
            opcode,
            payload,
            result: Some(result),
            source_token,
        });
        result
    }

    /// Appends an instruction with no result (destructor calls, frees).
    pub fn add_void_instruction(&mut self, opcode: Opcode, payload: IrPayload, source_token: Span) {
        self.instructions.push(IrInstruction {
            opcode,
            payload,
            result: None,
            source_token,
        });
    }

    pub fn next_temp_var(&mut self) -> TempVar {
        let var = self.next_var;
        self.next_var += 1;
        var
    }

    pub fn instructions(&self) -> &[IrInstruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
