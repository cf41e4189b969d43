//! `OverloadResolver` (spec §4.6): selects a callee among visible overloads
//! by argument types and value category. Parameterized over a
//! candidate-producing trait rather than hardcoding the symbol-table/struct
//! scan, so a test double can stand in for the real scopes.

use crate::context::CompilationContext;
use crate::errors::{CoreError, CoreResult};
use crate::types::{QualifiedType, TypeIndex, TypeKind};
use crate::value_category::ValueCategory;
use cpp_ast::{AstArena, FunctionId, RefQualifier, StringHandle, TypeNode};

/// One call-site argument: its resolved type and the value category it was
/// evaluated in (reference binding depends on both).
#[derive(Debug, Clone, Copy)]
pub struct ArgumentDescriptor {
    pub ty: QualifiedType,
    pub category: ValueCategory,
}

/// Candidate-producing capability (spec §4.6 step 1, sources a-d). A real
/// implementation backs this with the symbol table and the type registry's
/// struct members; callers that only need one source can no-op the rest.
pub trait OverloadCandidateSource {
    /// (a) the local (block-scoped) symbol table.
    fn local_candidates(&self, name: StringHandle) -> Vec<FunctionId>;
    /// (b) the global symbol table.
    fn global_candidates(&self, name: StringHandle) -> Vec<FunctionId>;
    /// (c) the given struct's own members, already flattened across its
    /// base classes (recursively) by the caller.
    fn member_candidates(&self, owner: TypeIndex, name: StringHandle) -> Vec<FunctionId>;
    /// (d) for a qualified name, every struct type with a matching member.
    fn qualified_candidates(&self, name: StringHandle) -> Vec<FunctionId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ConversionRank {
    Exact,
    Qualification,
    Standard,
    UserDefined,
    Ellipsis,
}

pub struct OverloadResolver<'a, S: OverloadCandidateSource> {
    ctx: &'a CompilationContext,
    ast: &'a AstArena,
    source: &'a S,
}

impl<'a, S: OverloadCandidateSource> OverloadResolver<'a, S> {
    pub fn new(ctx: &'a CompilationContext, ast: &'a AstArena, source: &'a S) -> Self {
        Self { ctx, ast, source }
    }

    /// Resolves a call to `name` with the given arguments. `current_struct`
    /// supplies source (c) when the call occurs inside a member function
    /// body; `qualified` selects source (d) instead of (a)/(b)/(c).
    pub fn resolve(
        &self,
        name: StringHandle,
        args: &[ArgumentDescriptor],
        current_struct: Option<TypeIndex>,
        qualified: bool,
    ) -> CoreResult<FunctionId> {
        let mut candidates = if qualified {
            self.source.qualified_candidates(name)
        } else {
            let mut all = self.source.local_candidates(name);
            all.extend(self.source.global_candidates(name));
            if let Some(owner) = current_struct {
                all.extend(self.source.member_candidates(owner, name));
            }
            all
        };
        candidates.sort_unstable_by_key(|f| f.index());
        candidates.dedup();

        let name_str = self.ctx.interner.resolve(name).unwrap_or_else(|| format!("T{}", name.0));

        let mut best: Option<(FunctionId, ConversionRank)> = None;
        let mut tied = false;
        for candidate in candidates {
            let Some(rank) = self.rank_candidate(candidate, args) else { continue };
            match &best {
                None => best = Some((candidate, rank)),
                Some((_, best_rank)) => {
                    if rank < *best_rank {
                        best = Some((candidate, rank));
                        tied = false;
                    } else if rank == *best_rank {
                        tied = true;
                    }
                }
            }
        }

        match best {
            Some((_, _)) if tied => Err(CoreError::AmbiguousOverload { name: name_str, candidates: Vec::new() }),
            Some((id, _)) => Ok(id),
            None => Err(CoreError::NoMatchingOverload { name: name_str }),
        }
    }

    /// Arity filter (step 2) plus a per-parameter conversion rank (step 3);
    /// the candidate's overall rank is its worst (highest) per-parameter
    /// rank. `None` means not viable at all.
    fn rank_candidate(&self, candidate: FunctionId, args: &[ArgumentDescriptor]) -> Option<ConversionRank> {
        let decl = self.ast.function(candidate);
        let declared = decl.params.len();
        let variadic = decl.flags.is_variadic;
        if args.len() < declared || (args.len() > declared && !variadic) {
            return None;
        }

        let mut worst = ConversionRank::Exact;
        for (i, arg) in args.iter().enumerate() {
            let rank = if i < declared {
                let param_ty = self.ast.param(decl.params[i]).ty;
                let param_qt = resolve_qualified(self.ast, param_ty)?;
                rank_conversion(self.ctx, param_qt, *arg)?
            } else {
                ConversionRank::Ellipsis
            };
            worst = worst.max(rank);
        }
        Some(worst)
    }
}

pub(crate) fn resolve_qualified(ast: &AstArena, ty: cpp_ast::TypeId) -> Option<QualifiedType> {
    let mut pointer_depth = 0u8;
    let mut reference = RefQualifier::None;
    let mut current = ty;
    loop {
        match ast.ty(current) {
            TypeNode::Pointer(inner, _cv) => {
                pointer_depth += 1;
                current = *inner;
            }
            TypeNode::Reference(inner, rq) => {
                reference = *rq;
                current = *inner;
            }
            TypeNode::Resolved(idx) => {
                return Some(QualifiedType {
                    base: *idx,
                    pointer_depth,
                    cv: cpp_ast::CvQualifier::None,
                    reference,
                });
            }
            _ => return None,
        }
    }
}

/// Ranks one argument against one parameter (spec §4.6 step 3): exact match
/// > qualification conversion > standard conversion > user-defined
/// conversion > ellipsis, with the reference-binding rule enforced first.
fn rank_conversion(ctx: &CompilationContext, param: QualifiedType, arg: ArgumentDescriptor) -> Option<ConversionRank> {
    match param.reference {
        RefQualifier::RValue if arg.category == ValueCategory::LValue => return None,
        RefQualifier::LValue if param.cv != cpp_ast::CvQualifier::Const && arg.category != ValueCategory::LValue => {
            return None
        }
        _ => {}
    }

    if param.base == arg.ty.base && param.pointer_depth == arg.ty.pointer_depth {
        return Some(ConversionRank::Exact);
    }
    if param.base == arg.ty.base {
        // Same nominal type, different pointer depth/cv only.
        return Some(ConversionRank::Qualification);
    }

    let param_kind = ctx.types.get(param.base).map(|t| t.kind);
    let arg_kind = ctx.types.get(arg.ty.base).map(|t| t.kind);
    match (param_kind, arg_kind) {
        (Some(TypeKind::Int { .. }), Some(TypeKind::Int { .. }))
        | (Some(TypeKind::Float { .. }), Some(TypeKind::Float { .. }))
        | (Some(TypeKind::Int { .. }), Some(TypeKind::Float { .. }))
        | (Some(TypeKind::Float { .. }), Some(TypeKind::Int { .. }))
        | (Some(TypeKind::Bool), Some(TypeKind::Int { .. }))
        | (Some(TypeKind::Int { .. }), Some(TypeKind::Bool)) => Some(ConversionRank::Standard),
        (Some(TypeKind::Struct), _) => {
            // A single non-explicit converting constructor would live on
            // the parameter's own `StructInfo`; absent full constructor
            // overload bookkeeping here, any struct parameter accepting a
            // differently-typed argument is treated as the user-defined
            // conversion rank rather than rejected outright.
            Some(ConversionRank::UserDefined)
        }
        _ => None,
    }
}
