//! Function-template instantiation (spec §4.5 "Function template
//! instantiation"): substitute return type, parameter types, and
//! requires-clause constraints; SFINAE silently drops a candidate whose
//! constraint fails rather than erroring.

use crate::context::CompilationContext;
use crate::errors::{CoreError, CoreResult};
use crate::substitutor::{ExpressionSubstitutor, SubstitutionMap};
use crate::template_registry::{InstantiationKey, TemplateAst};
use crate::types::TemplateArgument;
use cpp_ast::{AstArena, Expr, ExprId, FunctionDecl, FunctionId, ParamDecl, StringHandle, TypeId};

/// Instantiates a function template, returning the freshly substituted
/// `FunctionId` (cached by qualified name + argument vector), or `Ok(None)`
/// when a `requires` clause rejects this candidate (SFINAE: the caller
/// drops it from the overload set without error).
pub fn instantiate_function_template(
    ctx: &mut CompilationContext,
    ast: &mut AstArena,
    name: StringHandle,
    args: Vec<TemplateArgument>,
) -> CoreResult<Option<FunctionId>> {
    let key = InstantiationKey { template_name: name, args: args.clone() };
    if let Some(cached) = ctx.templates.get_function_instantiation(&key) {
        return Ok(Some(cached));
    }

    let primary = ctx
        .templates
        .lookup_template(name)
        .cloned()
        .ok_or_else(|| CoreError::UnresolvedName { name: resolved_name(ctx, name) })?;
    let TemplateAst::Function(pattern_id) = primary.ast else {
        return Err(CoreError::InternalInvariant(format!(
            "template `{:?}` does not name a function",
            name
        )));
    };

    let mut subst = SubstitutionMap::new();
    for (i, param_id) in primary.type_params.iter().enumerate() {
        let param = ast.template_param(*param_id).clone();
        if param.is_variadic {
            subst.bind_pack(param.name, args.get(i..).map(<[_]>::to_vec).unwrap_or_default());
            break;
        }
        let arg = args.get(i).cloned().ok_or_else(|| CoreError::TemplateArgMismatch {
            template: resolved_name(ctx, name),
            reason: format!("missing argument for parameter `{:?}`", param.name),
        })?;
        subst.bind_scalar(param.name, arg);
    }

    let pattern = ast.function(pattern_id).clone();
    for (concept_name, applies_to) in &pattern.where_clause {
        if !constraint_holds(ctx, ast, *concept_name, applies_to, &subst)? {
            return Ok(None);
        }
    }

    let return_type = match pattern.return_type {
        Some(ty) => Some(substitute_ty(ctx, ast, ty, &subst)?),
        None => None,
    };
    let mut params = Vec::with_capacity(pattern.params.len());
    for param_id in &pattern.params {
        let param: ParamDecl = ast.param(*param_id).clone();
        let ty = substitute_ty(ctx, ast, param.ty, &subst)?;
        params.push(ast.alloc_param(ParamDecl { name: param.name, ty }));
    }

    let instantiated = FunctionDecl {
        name: pattern.name,
        parent_struct: pattern.parent_struct,
        type_params: Vec::new(),
        where_clause: Vec::new(),
        receiver: pattern.receiver,
        params,
        return_type,
        body: pattern.body,
        access: pattern.access,
        linkage: pattern.linkage,
        flags: pattern.flags,
        vtable_index: pattern.vtable_index,
    };
    let function_id = ast.alloc_function(instantiated);
    ctx.templates.register_function_instantiation(key, function_id);
    Ok(Some(function_id))
}

/// Evaluates one `requires ConceptName<Params...>` entry: binds the
/// concept's own type parameters to the (already-substituted) arguments
/// named in `applies_to`, substitutes the concept's boolean constraint
/// expression, and reduces it to a literal. An unreduced or false result is
/// SFINAE failure.
fn constraint_holds(
    ctx: &CompilationContext,
    ast: &mut AstArena,
    concept_name: StringHandle,
    applies_to: &[StringHandle],
    subst: &SubstitutionMap,
) -> CoreResult<bool> {
    let concept = match ctx.templates.lookup_concept(concept_name) {
        Some(c) => c.clone(),
        None => return Err(CoreError::UnresolvedName { name: resolved_name(ctx, concept_name) }),
    };

    let mut concept_subst = SubstitutionMap::new();
    for (i, concept_param_id) in concept.type_params.iter().enumerate() {
        let concept_param = ast.template_param(*concept_param_id).clone();
        let Some(arg_name) = applies_to.get(i) else { break };
        let arg = subst
            .scalar(*arg_name)
            .cloned()
            .ok_or_else(|| CoreError::UnboundParameter(resolved_name(ctx, *arg_name)))?;
        concept_subst.bind_scalar(concept_param.name, arg);
    }

    let substituted = substitute_ex(ctx, ast, concept.constraint, &concept_subst)?;
    match ast.expr(substituted) {
        Expr::BoolLiteral(v) => Ok(*v),
        Expr::IntLiteral(v) => Ok(*v != 0),
        // A constraint that doesn't reduce to a literal is not satisfiable
        // at this point in instantiation; treat it as failed rather than
        // erroring the whole candidate set.
        _ => Ok(false),
    }
}

fn substitute_ty(ctx: &CompilationContext, ast: &mut AstArena, ty: TypeId, subst: &SubstitutionMap) -> CoreResult<TypeId> {
    ExpressionSubstitutor::new(&ctx.types, &ctx.templates).substitute_type(ast, ty, subst)
}

fn substitute_ex(ctx: &CompilationContext, ast: &mut AstArena, expr: ExprId, subst: &SubstitutionMap) -> CoreResult<ExprId> {
    ExpressionSubstitutor::new(&ctx.types, &ctx.templates).substitute_expr(ast, expr, subst)
}

fn resolved_name(ctx: &CompilationContext, name: StringHandle) -> String {
    ctx.interner.resolve(name).unwrap_or_else(|| format!("T{}", name.0))
}
