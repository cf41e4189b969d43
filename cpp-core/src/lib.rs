//! The template-instantiation and expression-lowering core (spec §1, §2):
//! the part of a C++-like front end that matches use-sites against
//! templates, substitutes arguments through declarations, lays out structs,
//! and lowers expressions to a flat typed IR. The lexer, parser driver, and
//! machine-code backend are deliberately out of scope; see [`external`] for
//! the trait surface this crate consumes from them.

pub mod context;
pub mod errors;
pub mod external;
pub mod instantiation;
pub mod interner;
pub mod ir;
pub mod lowering;
pub mod substitutor;
pub mod template_registry;
pub mod types;
pub mod value_category;

pub use context::{CompilationContext, EngineConfig, Prelude};
pub use errors::{CoreError, CoreResult};
pub use instantiation::{instantiate_class_template, instantiate_function_template, InProgressGuard};
pub use interner::StringInterner;
pub use ir::{IrBuilder, IrInstruction, IrPayload, Opcode, TempVar, TypedValue};
pub use lowering::{
    ArgumentDescriptor, EvalMode, FunctionLowering, NameMangler, OverloadCandidateSource, OverloadResolver,
};
pub use template_registry::TemplateRegistry;
pub use value_category::{
    AssignmentTarget, LValueBase, LValueInfo, LValueKind, TempVarMetadata, ValueCategory, ValueCategoryTracker,
};
