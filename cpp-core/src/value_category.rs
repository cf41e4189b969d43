//! Value-category tracking (spec §4.7 "Value-category tracking",
//! §6 `ValueCategoryTracker`): attaches lvalue/xvalue/prvalue metadata to
//! every temporary produced while lowering a function body, so that
//! assignment and address-taking can resolve through the metadata instead
//! of re-deriving it from the originating expression.
//!
//! Owned per-function by `ExpressionLowering` and dropped on function exit
//! (spec §5 "`TempVar` metadata tables are owned per-function... and freed
//! on function exit"), mirroring `IrBuilder`'s own per-function lifetime.

use crate::errors::{CoreError, CoreResult};
use crate::ir::TempVar;
use crate::types::TypeIndex;
use cpp_ast::StringHandle;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    PRValue,
    LValue,
    XValue,
}

impl ValueCategory {
    /// Lvalues and xvalues are glvalues: both have identity, i.e. an
    /// `LValueInfo` recording where they live (spec §3 invariant: "if its
    /// metadata's category is `LValue` or `XValue`, the recorded base is
    /// either an interned name... or another `TempVar` whose metadata is
    /// itself an address").
    pub fn is_glvalue(self) -> bool {
        matches!(self, ValueCategory::LValue | ValueCategory::XValue)
    }
}

/// The ultimate storage location an lvalue/xvalue's address is computed
/// from, before offset/index/bitfield refinement is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LValueBase {
    /// A named local or global (spec: "a named variable is an lvalue with
    /// kind `Direct` and its name as base").
    Name(StringHandle),
    /// Another temporary whose own metadata is itself an address (e.g. the
    /// object operand of a chained `a.b.c` access, or a loaded pointer).
    Temp(TempVar),
}

/// How an lvalue/xvalue resolves to a store/load site (spec §4.7
/// "Assignment to an lvalue resolves through the metadata").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LValueKind {
    /// Direct store/load by name.
    Direct,
    /// Store/load at `base + offset`, dereferencing first if
    /// `is_pointer_to_member`.
    Member,
    /// Indexed store/load using the recorded array index.
    ArrayElement,
    /// Store/load through a loaded address (e.g. `*p`).
    Indirect,
}

/// Everything needed to resolve a store or re-take the address of a
/// glvalue (spec §4.7: "`LValueInfo` carries the base (name or TempVar),
/// byte offset, optional member name, optional bitfield width/offset,
/// optional array-index `IrValue`, and pointer-to-member/array flags").
#[derive(Debug, Clone, Copy)]
pub struct LValueInfo {
    pub kind: LValueKind,
    pub base: LValueBase,
    pub byte_offset: u64,
    pub member_name: Option<StringHandle>,
    /// `(bit_width, bit_offset)`, set only for bitfield members.
    pub bitfield: Option<(u32, u32)>,
    /// The temporary holding the evaluated index, for `ArrayElement`.
    pub array_index: Option<TempVar>,
    pub is_pointer_to_member: bool,
}

impl LValueInfo {
    pub fn direct(name: StringHandle) -> Self {
        Self {
            kind: LValueKind::Direct,
            base: LValueBase::Name(name),
            byte_offset: 0,
            member_name: None,
            bitfield: None,
            array_index: None,
            is_pointer_to_member: false,
        }
    }

    /// `obj.m`: an lvalue whose base is the object's base with offset
    /// combined (spec: "`obj.m` is an lvalue whose base is the object's
    /// base with offset combined").
    pub fn member(base: LValueBase, byte_offset: u64, member_name: StringHandle) -> Self {
        Self {
            kind: LValueKind::Member,
            base,
            byte_offset,
            member_name: Some(member_name),
            bitfield: None,
            array_index: None,
            is_pointer_to_member: false,
        }
    }

    pub fn with_bitfield(mut self, width: u32, bit_offset: u32) -> Self {
        self.bitfield = Some((width, bit_offset));
        self
    }

    pub fn with_pointer_to_member(mut self) -> Self {
        self.is_pointer_to_member = true;
        self
    }

    /// `a[i]`: an lvalue whose base is the array base and whose index is
    /// recorded for the store path (spec: "`a[i]` is an lvalue whose base
    /// is the array base and whose array-index is recorded").
    pub fn array_element(base: LValueBase, index: TempVar) -> Self {
        Self {
            kind: LValueKind::ArrayElement,
            base,
            byte_offset: 0,
            member_name: None,
            bitfield: None,
            array_index: Some(index),
            is_pointer_to_member: false,
        }
    }

    /// `*p`: store/load through a loaded pointer value.
    pub fn indirect(pointer_var: TempVar) -> Self {
        Self {
            kind: LValueKind::Indirect,
            base: LValueBase::Temp(pointer_var),
            byte_offset: 0,
            member_name: None,
            bitfield: None,
            array_index: None,
            is_pointer_to_member: false,
        }
    }
}

/// Metadata attached to one `TempVar` (spec: `TempVarMetadata = { category,
/// lvalue_info?, pointee_kind, pointee_bit_size }`).
#[derive(Debug, Clone, Copy)]
pub struct TempVarMetadata {
    pub category: ValueCategory,
    pub lvalue_info: Option<LValueInfo>,
    pub pointee_kind: TypeIndex,
    pub pointee_bit_size: u64,
}

/// What a store instruction needs to target an lvalue, resolved from its
/// metadata rather than re-walked from the original expression.
#[derive(Debug, Clone, Copy)]
pub enum AssignmentTarget {
    Direct { name: StringHandle },
    Member { base: LValueBase, byte_offset: u64, bitfield: Option<(u32, u32)>, is_pointer_to_member: bool },
    ArrayElement { base: LValueBase, index: TempVar },
    Indirect { pointer_var: TempVar },
}

/// Owns the `TempVar → TempVarMetadata` table for one function's lowering
/// pass (spec §6 `ValueCategoryTracker`).
#[derive(Debug, Default)]
pub struct ValueCategoryTracker {
    metadata: HashMap<TempVar, TempVarMetadata>,
}

impl ValueCategoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_prvalue(&mut self, var: TempVar, pointee_kind: TypeIndex, pointee_bit_size: u64) {
        self.metadata.insert(
            var,
            TempVarMetadata { category: ValueCategory::PRValue, lvalue_info: None, pointee_kind, pointee_bit_size },
        );
    }

    pub fn record_lvalue(&mut self, var: TempVar, info: LValueInfo, pointee_kind: TypeIndex, pointee_bit_size: u64) {
        self.metadata.insert(
            var,
            TempVarMetadata {
                category: ValueCategory::LValue,
                lvalue_info: Some(info),
                pointee_kind,
                pointee_bit_size,
            },
        );
    }

    pub fn record_xvalue(&mut self, var: TempVar, info: LValueInfo, pointee_kind: TypeIndex, pointee_bit_size: u64) {
        self.metadata.insert(
            var,
            TempVarMetadata {
                category: ValueCategory::XValue,
                lvalue_info: Some(info),
                pointee_kind,
                pointee_bit_size,
            },
        );
    }

    /// `static_cast<T&&>(e)` always yields an xvalue, regardless of `e`'s
    /// own category (spec: "produces an xvalue regardless of `e`'s
    /// category"). If `source` was itself a glvalue its `LValueInfo` is
    /// reused directly; if it was a prvalue the caller must first
    /// materialize it to a named temporary and pass that temporary's own
    /// address as `materialized_base` (materialization itself needs an
    /// `IrBuilder` and so is lowering's job, not this tracker's).
    pub fn cast_to_xvalue(
        &mut self,
        var: TempVar,
        source: TempVar,
        materialized_base: Option<LValueBase>,
    ) -> CoreResult<()> {
        let source_meta = self.metadata.get(&source).copied().ok_or_else(|| {
            CoreError::InternalInvariant(format!("no metadata recorded for source TempVar {}", source))
        })?;
        let info = match (source_meta.lvalue_info, materialized_base) {
            (Some(info), _) => info,
            (None, Some(base)) => LValueInfo {
                kind: LValueKind::Direct,
                base,
                byte_offset: 0,
                member_name: None,
                bitfield: None,
                array_index: None,
                is_pointer_to_member: false,
            },
            (None, None) => {
                return Err(CoreError::InternalInvariant(
                    "xvalue cast of a prvalue requires a materialized base".to_string(),
                ))
            }
        };
        self.record_xvalue(var, info, source_meta.pointee_kind, source_meta.pointee_bit_size);
        Ok(())
    }

    pub fn metadata(&self, var: TempVar) -> Option<&TempVarMetadata> {
        self.metadata.get(&var)
    }

    pub fn category(&self, var: TempVar) -> Option<ValueCategory> {
        self.metadata.get(&var).map(|m| m.category)
    }

    pub fn is_glvalue(&self, var: TempVar) -> bool {
        self.category(var).map(ValueCategory::is_glvalue).unwrap_or(false)
    }

    /// Resolves a store target for `var` (spec: "Assignment to an lvalue
    /// resolves through the metadata"). Errors if `var` is not a glvalue or
    /// has no metadata recorded.
    pub fn resolve_assignment_target(&self, var: TempVar) -> CoreResult<AssignmentTarget> {
        let meta = self
            .metadata
            .get(&var)
            .ok_or_else(|| CoreError::InternalInvariant(format!("no metadata recorded for TempVar {}", var)))?;
        if !meta.category.is_glvalue() {
            return Err(CoreError::InternalInvariant(format!(
                "TempVar {} is not assignable: category is {:?}",
                var, meta.category
            )));
        }
        let info = meta.lvalue_info.ok_or_else(|| {
            CoreError::InternalInvariant(format!("glvalue TempVar {} carries no LValueInfo", var))
        })?;
        Ok(match info.kind {
            LValueKind::Direct => {
                let LValueBase::Name(name) = info.base else {
                    return Err(CoreError::InternalInvariant(format!(
                        "Direct TempVar {} does not base on a name",
                        var
                    )));
                };
                AssignmentTarget::Direct { name }
            }
            LValueKind::Member => AssignmentTarget::Member {
                base: info.base,
                byte_offset: info.byte_offset,
                bitfield: info.bitfield,
                is_pointer_to_member: info.is_pointer_to_member,
            },
            LValueKind::ArrayElement => AssignmentTarget::ArrayElement {
                base: info.base,
                index: info.array_index.ok_or_else(|| {
                    CoreError::InternalInvariant(format!("ArrayElement TempVar {} carries no index", var))
                })?,
            },
            LValueKind::Indirect => {
                let LValueBase::Temp(pointer_var) = info.base else {
                    return Err(CoreError::InternalInvariant(format!(
                        "Indirect TempVar {} does not base on a loaded pointer",
                        var
                    )));
                };
                AssignmentTarget::Indirect { pointer_var }
            }
        })
    }

    pub fn clear(&mut self) {
        self.metadata.clear();
    }
}
