//! The type system's data model (spec §3) and the [`TypeRegistry`]
//! (spec §4.1): process-wide interning of types, each carrying kind, size,
//! alignment, an interned name, a stable dense index, and optional
//! struct/enum/template-instantiation metadata.

mod struct_info;
mod template_argument;

pub use struct_info::{
    BaseClassInfo, LayoutError, MemberFunction, StaticMember, StructFlags, StructInfo,
    StructMember, VtableSlot,
};
pub use template_argument::{TemplateArgKind, TemplateArgument, TemplateInstantiationInfo};

use crate::errors::{CoreError, CoreResult};
pub use cpp_ast::TypeIndex;
use cpp_ast::{CvQualifier, RefQualifier, StringHandle, TypeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Int { bits: u16, signed: bool },
    Float { bits: u16 },
    Bool,
    Char,
    Enum,
    Struct,
    Union,
    Function,
    Nullptr,
    Auto,
    UserDefined,
    /// A type still naming an unsubstituted template parameter.
    Dependent,
}

#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub underlying: TypeKind,
    pub underlying_bits: u64,
    pub variants: Vec<(StringHandle, i64)>,
}

/// One entry in the type registry. Create-once, append-only, never deleted
/// (spec §3 lifecycle).
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub size_in_bits: u64,
    pub alignment: u32,
    pub name: StringHandle,
    pub type_index: TypeIndex,
    pub struct_info: Option<StructInfo>,
    pub enum_info: Option<EnumInfo>,
    pub template_instantiation_info: Option<TemplateInstantiationInfo>,
    /// `using name = X;` members, keyed by name, target already substituted.
    /// Consulted by the substitutor when resolving a dependent
    /// `BaseTemplate<Args>::member` qualified name (the `void_t` idiom).
    pub type_aliases: Vec<(StringHandle, TypeId)>,
}

/// Reference/pointer/cv-qualification wrapper applied on top of a base
/// `TypeIndex`. Kept separate from `TypeInfo` itself: the registry indexes
/// unqualified nominal types, and qualifiers are layered at use sites
/// (parameters, template arguments, casts) the way the AST's
/// `TypeNode::Pointer`/`Reference` wrap an inner `TypeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QualifiedType {
    pub base: TypeIndex,
    pub pointer_depth: u8,
    pub cv: CvQualifier,
    pub reference: RefQualifier,
}

impl QualifiedType {
    pub fn plain(base: TypeIndex) -> Self {
        Self {
            base,
            pointer_depth: 0,
            cv: CvQualifier::None,
            reference: RefQualifier::None,
        }
    }
}

/// Process-wide interning of types (spec §4.1).
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: Vec<TypeInfo>,
    by_name: HashMap<StringHandle, TypeIndex>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new, non-template, non-alias type. Fails with
    /// `DuplicateType` only if a type with the same name handle is already
    /// registered (spec §4.1).
    pub fn add_type(
        &mut self,
        name: StringHandle,
        kind: TypeKind,
        size_bits: u64,
    ) -> CoreResult<TypeIndex> {
        if self.by_name.contains_key(&name) {
            return Err(CoreError::DuplicateType(name));
        }
        let index = TypeIndex(self.entries.len() as u32);
        let alignment = default_alignment_for(&kind, size_bits);
        self.entries.push(TypeInfo {
            kind,
            size_in_bits: size_bits,
            alignment,
            name,
            type_index: index,
            struct_info: None,
            enum_info: None,
            template_instantiation_info: None,
            type_aliases: Vec::new(),
        });
        self.by_name.insert(name, index);
        Ok(index)
    }

    /// Registers a type without requiring name uniqueness — used for
    /// template instantiations, whose mangled names are synthesized fresh
    /// every time and therefore cannot collide, and for placeholder types
    /// minted while an instantiation is still in progress.
    pub fn add_type_unchecked(&mut self, name: StringHandle, kind: TypeKind, size_bits: u64) -> TypeIndex {
        let index = TypeIndex(self.entries.len() as u32);
        let alignment = default_alignment_for(&kind, size_bits);
        self.entries.push(TypeInfo {
            kind,
            size_in_bits: size_bits,
            alignment,
            name,
            type_index: index,
            struct_info: None,
            enum_info: None,
            template_instantiation_info: None,
            type_aliases: Vec::new(),
        });
        // Do not overwrite an existing name→index mapping: the first
        // registration under a given name wins for `find_by_name` lookups.
        self.by_name.entry(name).or_insert(index);
        index
    }

    pub fn get(&self, index: TypeIndex) -> Option<&TypeInfo> {
        self.entries.get(index.0 as usize)
    }

    pub fn get_mut(&mut self, index: TypeIndex) -> Option<&mut TypeInfo> {
        self.entries.get_mut(index.0 as usize)
    }

    pub fn find_by_name(&self, handle: StringHandle) -> Option<TypeIndex> {
        self.by_name.get(&handle).copied()
    }

    pub fn set_struct_info(&mut self, index: TypeIndex, info: StructInfo) -> CoreResult<()> {
        let total_size = info.total_size;
        let alignment = info.alignment;
        let entry = self
            .entries
            .get_mut(index.0 as usize)
            .ok_or_else(|| CoreError::InternalInvariant(format!("unknown type index {:?}", index)))?;
        entry.size_in_bits = total_size * 8;
        entry.alignment = alignment;
        entry.struct_info = Some(info);
        Ok(())
    }

    pub fn set_enum_info(&mut self, index: TypeIndex, info: EnumInfo) -> CoreResult<()> {
        let entry = self
            .entries
            .get_mut(index.0 as usize)
            .ok_or_else(|| CoreError::InternalInvariant(format!("unknown type index {:?}", index)))?;
        entry.size_in_bits = info.underlying_bits;
        entry.enum_info = Some(info);
        Ok(())
    }

    pub fn set_template_instantiation_info(
        &mut self,
        index: TypeIndex,
        base_name: StringHandle,
        args: Vec<TemplateArgument>,
    ) -> CoreResult<()> {
        let entry = self
            .entries
            .get_mut(index.0 as usize)
            .ok_or_else(|| CoreError::InternalInvariant(format!("unknown type index {:?}", index)))?;
        entry.template_instantiation_info = Some(TemplateInstantiationInfo {
            base_template_name: base_name,
            args,
        });
        Ok(())
    }

    pub fn register_type_alias(&mut self, owner: TypeIndex, name: StringHandle, target: TypeId) -> CoreResult<()> {
        let entry = self
            .entries
            .get_mut(owner.0 as usize)
            .ok_or_else(|| CoreError::InternalInvariant(format!("unknown type index {:?}", owner)))?;
        entry.type_aliases.push((name, target));
        Ok(())
    }

    pub fn find_type_alias(&self, owner: TypeIndex, name: StringHandle) -> Option<TypeId> {
        self.get(owner)?.type_aliases.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    pub fn all_types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn default_alignment_for(kind: &TypeKind, size_bits: u64) -> u32 {
    match kind {
        TypeKind::Void | TypeKind::Auto | TypeKind::Dependent => 1,
        TypeKind::Bool | TypeKind::Char => 1,
        _ => {
            let bytes = (size_bits / 8).max(1);
            // Natural alignment: the largest power of two not exceeding the
            // size, capped at 16 (the common max scalar alignment).
            let mut align = 1u32;
            while (align as u64) * 2 <= bytes && align < 16 {
                align *= 2;
            }
            align
        }
    }
}
