//! `TemplateArgument` (spec §3): the resolved, post-substitution form of a
//! template argument, as opposed to `cpp_ast::TemplateArgNode`, which is the
//! as-written AST shape before substitution runs.

use super::TypeIndex;
use cpp_ast::{CvQualifier, RefQualifier, StringHandle};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateArgKind {
    Type {
        type_index: Option<TypeIndex>,
        pointer_depth: u8,
        cv: CvQualifier,
        ref_qualifier: RefQualifier,
    },
    Value {
        value: i64,
        value_type: Option<TypeIndex>,
    },
    Pack(Vec<TemplateArgument>),
}

/// A single resolved template argument. `is_dependent` is true while the
/// argument still mentions an outer (still-unsubstituted) template
/// parameter — e.g. inside a nested template whose own arguments have not
/// been fully resolved yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateArgument {
    pub kind: TemplateArgKind,
    pub is_dependent: bool,
}

impl TemplateArgument {
    pub fn concrete_type(type_index: TypeIndex) -> Self {
        Self {
            kind: TemplateArgKind::Type {
                type_index: Some(type_index),
                pointer_depth: 0,
                cv: CvQualifier::None,
                ref_qualifier: RefQualifier::None,
            },
            is_dependent: false,
        }
    }

    pub fn value(value: i64, value_type: Option<TypeIndex>) -> Self {
        Self {
            kind: TemplateArgKind::Value { value, value_type },
            is_dependent: false,
        }
    }

    pub fn pack(args: Vec<TemplateArgument>) -> Self {
        let is_dependent = args.iter().any(|a| a.is_dependent);
        Self {
            kind: TemplateArgKind::Pack(args),
            is_dependent,
        }
    }

    pub fn dependent_type_placeholder() -> Self {
        Self {
            kind: TemplateArgKind::Type {
                type_index: None,
                pointer_depth: 0,
                cv: CvQualifier::None,
                ref_qualifier: RefQualifier::None,
            },
            is_dependent: true,
        }
    }
}

/// Attached to a `TypeInfo` entry that is itself a template instantiation:
/// which base template it came from, and with what arguments (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateInstantiationInfo {
    pub base_template_name: StringHandle,
    pub args: Vec<TemplateArgument>,
}
