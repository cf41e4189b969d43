//! The error taxonomy from spec §7, as a single structured enum. Every
//! variant maps to one row of the table; recovery policy lives with the
//! callers (most errors are recorded into a `DiagnosticEngine` and
//! processing continues, per §7's "all errors except
//! `InstantiationDepthExceeded` and `InternalInvariant` are local").

use cpp_ast::StringHandle;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("unresolved name `{name}`")]
    UnresolvedName { name: String },

    #[error("ambiguous overload for `{name}`: {candidates:?}")]
    AmbiguousOverload { name: String, candidates: Vec<String> },

    #[error("no matching overload for `{name}`")]
    NoMatchingOverload { name: String },

    #[error("access violation: `{member}` is not accessible here")]
    AccessViolation { member: String },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("template argument mismatch for `{template}`: {reason}")]
    TemplateArgMismatch { template: String, reason: String },

    #[error("constraint failed for `{name}` (SFINAE)")]
    ConstraintFailed { name: String },

    #[error("static_assert failed: {message}")]
    StaticAssertFailed { message: String },

    #[error("layout error for `{type_name}`: {reason}")]
    LayoutError { type_name: String, reason: String },

    #[error("possible infinite instantiation: `{template}` exceeded {limit} steps")]
    InstantiationDepthExceeded { template: String, limit: usize },

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("duplicate type registration for `{0:?}`")]
    DuplicateType(StringHandle),

    #[error("unbound template parameter `{0}` during substitution")]
    UnboundParameter(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
