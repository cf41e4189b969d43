//! Class-template instantiation (spec §4.5): the eight-step algorithm that
//! turns a base template name plus a resolved argument vector into a
//! concrete, laid-out `TypeIndex`.

use crate::context::CompilationContext;
use crate::errors::{CoreError, CoreResult};
use crate::instantiation::guard::InProgressGuard;
use crate::substitutor::{template_arg_node_to_argument, ExpressionSubstitutor, SubstitutionMap};
use crate::template_registry::{InstantiationKey, LazyInstantiationJob, TemplateAst};
use crate::types::{
    BaseClassInfo, MemberFunction, StaticMember, StructInfo, StructMember, TemplateArgKind,
    TemplateArgument, TypeIndex, TypeKind,
};
use cpp_ast::{
    AstArena, Expr, FunctionDecl, ParamDecl, RefQualifier, StringHandle, StructDecl, StructId,
    TemplateArgNode, TemplateParamDefault, TypeId, TypeNode,
};
use cpp_diagnostics::{Diagnostic, Span};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Instantiates (or returns the cached instantiation of) the class template
/// named `name` with argument vector `args`. `force_eager` overrides the
/// lazy member-function policy, as an explicit-instantiation call site
/// would (spec §4.5, §4.9 `force_eager`).
pub fn instantiate_class_template(
    ctx: &mut CompilationContext,
    ast: &mut AstArena,
    name: StringHandle,
    args: Vec<TemplateArgument>,
    force_eager: bool,
) -> CoreResult<TypeIndex> {
    // Step 1: a dependent argument means this use site is itself still
    // inside an uninstantiated template; mint an unregistered placeholder
    // rather than attempting real layout.
    if args.iter().any(|a| a.is_dependent) {
        return Ok(ctx.types.add_type_unchecked(name, TypeKind::Dependent, 0));
    }

    let key = InstantiationKey {
        template_name: name,
        args: args.clone(),
    };

    // Step 3 (checked ahead of the guard: a cached instantiation can never
    // still be "in progress", so there is nothing to race here).
    if let Some(cached) = ctx.templates.get_instantiation(&key) {
        return Ok(cached);
    }

    // Step 2: cycle / CRTP self-reference detection. A key already pending
    // deserves no diagnostic — per spec this is the ordinary CRTP shape
    // (`struct Derived : Base<Derived> {}`) and the caller that is lower on
    // the stack will finish the real instantiation.
    let guard = match InProgressGuard::enter(ctx.in_progress_set(), key.clone()) {
        Some(guard) => guard,
        None => return Ok(ctx.types.add_type_unchecked(name, TypeKind::Dependent, 0)),
    };

    if !ctx.enter_instantiation() {
        ctx.exit_instantiation();
        drop(guard);
        return Err(CoreError::InstantiationDepthExceeded {
            template: resolved_name(ctx, name),
            limit: ctx.config.max_instantiation_depth,
        });
    }

    let result = instantiate_inner(ctx, ast, name, &args, force_eager, &key);
    ctx.exit_instantiation();
    drop(guard);
    result
}

fn instantiate_inner(
    ctx: &mut CompilationContext,
    ast: &mut AstArena,
    name: StringHandle,
    args: &[TemplateArgument],
    force_eager: bool,
    key: &InstantiationKey,
) -> CoreResult<TypeIndex> {
    // Step 4: a full/explicit specialization, read off literally.
    if let Some(spec) = ctx.templates.lookup_exact_specialization(name, args, ast, &ctx.types) {
        let TemplateAst::Struct(struct_id) = spec.ast else {
            return Err(CoreError::InternalInvariant(format!(
                "specialization of `{:?}` does not name a struct",
                name
            )));
        };
        let qualified = mint_instantiation_name(ctx, name, args);
        let type_index = ctx.types.add_type_unchecked(qualified, TypeKind::Struct, 0);
        let empty = SubstitutionMap::new();
        build_instantiated_struct(ctx, ast, struct_id, &empty, type_index, qualified, force_eager)?;
        ctx.types.set_template_instantiation_info(type_index, name, args.to_vec())?;
        ctx.templates.register_instantiation(key.clone(), type_index);
        return Ok(type_index);
    }

    let primary = ctx
        .templates
        .lookup_template(name)
        .cloned()
        .ok_or_else(|| CoreError::UnresolvedName { name: resolved_name(ctx, name) })?;

    // Step 5: fill in defaulted trailing type parameters, including the
    // void_t SFINAE idiom: a default whose substitution fails to resolve
    // (`UnresolvedName`, e.g. a dependent `T::type` with no such member) or
    // is still structurally dependent binds a dependent placeholder instead
    // of erroring, so that it simply fails to unify against a specialization
    // pattern written in terms of a concrete type such as `void`.
    let full_args = fill_defaults(ctx, ast, &primary.type_params, args)?;

    // Step 6: partial specializations, most-specialized-wins.
    if let Some((spec, bindings)) = ctx
        .templates
        .match_specialization_pattern(name, &full_args, ast, &ctx.types)
        .map(|(s, b)| (s.clone(), b))
    {
        let TemplateAst::Struct(struct_id) = spec.ast else {
            return Err(CoreError::InternalInvariant(format!(
                "specialization of `{:?}` does not name a struct",
                name
            )));
        };
        let qualified = mint_instantiation_name(ctx, name, &full_args);
        let type_index = ctx.types.add_type_unchecked(qualified, TypeKind::Struct, 0);
        let mut subst = SubstitutionMap::new();
        for (param_name, arg) in bindings {
            bind_into(&mut subst, param_name, arg);
        }
        build_instantiated_struct(ctx, ast, struct_id, &subst, type_index, qualified, force_eager)?;
        ctx.types.set_template_instantiation_info(type_index, name, full_args)?;
        ctx.templates.register_instantiation(key.clone(), type_index);
        return Ok(type_index);
    }

    // Step 7: the primary template.
    let TemplateAst::Struct(struct_id) = primary.ast else {
        return Err(CoreError::InternalInvariant(format!(
            "primary template `{:?}` does not name a struct",
            name
        )));
    };
    let qualified = mint_instantiation_name(ctx, name, &full_args);
    let type_index = ctx.types.add_type_unchecked(qualified, TypeKind::Struct, 0);
    let mut subst = SubstitutionMap::new();
    for (i, param_id) in primary.type_params.iter().enumerate() {
        let param = ast.template_param(*param_id).clone();
        if param.is_variadic {
            bind_into(&mut subst, param.name, TemplateArgument::pack(full_args[i..].to_vec()));
            break;
        }
        let arg = full_args.get(i).cloned().ok_or_else(|| CoreError::TemplateArgMismatch {
            template: resolved_name(ctx, name),
            reason: format!("missing argument for parameter `{:?}`", param.name),
        })?;
        bind_into(&mut subst, param.name, arg);
    }

    // Step 8: layout, cache, done (the cache insert and the guard's release
    // both happen back in the caller).
    build_instantiated_struct(ctx, ast, struct_id, &subst, type_index, qualified, force_eager)?;
    ctx.types.set_template_instantiation_info(type_index, name, full_args)?;
    ctx.templates.register_instantiation(key.clone(), type_index);
    Ok(type_index)
}

fn bind_into(subst: &mut SubstitutionMap, name: StringHandle, arg: TemplateArgument) {
    if let TemplateArgKind::Pack(items) = arg.kind {
        subst.bind_pack(name, items);
    } else {
        subst.bind_scalar(name, arg);
    }
}

fn fill_defaults(
    ctx: &mut CompilationContext,
    ast: &mut AstArena,
    params: &[cpp_ast::TemplateParamId],
    provided: &[TemplateArgument],
) -> CoreResult<Vec<TemplateArgument>> {
    let mut full = provided.to_vec();
    let mut subst = SubstitutionMap::new();
    for (i, param_id) in params.iter().enumerate() {
        let param = ast.template_param(*param_id).clone();
        if let Some(arg) = full.get(i) {
            bind_into(&mut subst, param.name, arg.clone());
            continue;
        }
        if param.is_variadic {
            break;
        }
        let defaulted = match param.default {
            Some(TemplateParamDefault::Value(expr_id)) => {
                let substituted = substitute_ex(ctx, ast, expr_id, &subst)?;
                match ast.expr(substituted) {
                    Expr::IntLiteral(v) => TemplateArgument::value(*v, None),
                    _ => TemplateArgument::dependent_type_placeholder(),
                }
            }
            Some(TemplateParamDefault::Type(type_id)) => match substitute_ty(ctx, ast, type_id, &subst) {
                Ok(substituted) => match ast.ty(substituted) {
                    TypeNode::Resolved(idx) => TemplateArgument::concrete_type(*idx),
                    _ => TemplateArgument::dependent_type_placeholder(),
                },
                // A failed dependent member lookup (the void_t idiom):
                // treat this candidate as not-yet-resolvable rather than a
                // hard error, letting pattern matching fall through to the
                // primary template.
                Err(CoreError::UnresolvedName { .. }) => TemplateArgument::dependent_type_placeholder(),
                Err(other) => return Err(other),
            },
            None => {
                return Err(CoreError::TemplateArgMismatch {
                    template: resolved_name(ctx, param.name),
                    reason: "no argument and no default supplied".to_string(),
                })
            }
        };
        bind_into(&mut subst, param.name, defaulted.clone());
        full.push(defaulted);
    }
    Ok(full)
}

fn substitute_ty(
    ctx: &CompilationContext,
    ast: &mut AstArena,
    ty: TypeId,
    subst: &SubstitutionMap,
) -> CoreResult<TypeId> {
    ExpressionSubstitutor::new(&ctx.types, &ctx.templates).substitute_type(ast, ty, subst)
}

fn substitute_ex(
    ctx: &CompilationContext,
    ast: &mut AstArena,
    expr: cpp_ast::ExprId,
    subst: &SubstitutionMap,
) -> CoreResult<cpp_ast::ExprId> {
    ExpressionSubstitutor::new(&ctx.types, &ctx.templates).substitute_expr(ast, expr, subst)
}

fn mint_instantiation_name(ctx: &CompilationContext, base: StringHandle, args: &[TemplateArgument]) -> StringHandle {
    let mut hasher = DefaultHasher::new();
    base.hash(&mut hasher);
    args.hash(&mut hasher);
    let suffix = hasher.finish();
    let base_str = ctx.interner.resolve(base).unwrap_or_else(|| format!("T{}", base.0));
    ctx.interner.intern(&format!("{}#{:016x}", base_str, suffix))
}

fn resolved_name(ctx: &CompilationContext, name: StringHandle) -> String {
    ctx.interner.resolve(name).unwrap_or_else(|| format!("T{}", name.0))
}

fn builtin_index(ctx: &mut CompilationContext, name: &str, kind: TypeKind, bits: u64) -> TypeIndex {
    let handle = ctx.interner.intern(name);
    match ctx.types.find_by_name(handle) {
        Some(idx) => idx,
        None => ctx.types.add_type_unchecked(handle, kind, bits),
    }
}

fn resolve_base_type_index(ctx: &mut CompilationContext, ast: &mut AstArena, ty: TypeId) -> CoreResult<TypeIndex> {
    match ast.ty(ty).clone() {
        TypeNode::Resolved(idx) => Ok(idx),
        TypeNode::Named(name) => ctx
            .types
            .find_by_name(name)
            .ok_or_else(|| CoreError::UnresolvedName { name: resolved_name(ctx, name) }),
        TypeNode::Void => Ok(ctx.prelude.void),
        TypeNode::Bool => Ok(ctx.prelude.bool_),
        TypeNode::NullptrT => Ok(ctx.prelude.nullptr_t),
        TypeNode::Auto => Ok(ctx.prelude.auto_),
        TypeNode::Char => Ok(builtin_index(ctx, "char", TypeKind::Char, 8)),
        TypeNode::Int { bits, signed } => {
            let prefix = if signed { "int" } else { "uint" };
            Ok(builtin_index(ctx, &format!("{}{}_t", prefix, bits), TypeKind::Int { bits, signed }, bits as u64))
        }
        TypeNode::Float { bits } => Ok(builtin_index(ctx, &format!("float{}_t", bits), TypeKind::Float { bits }, bits as u64)),
        TypeNode::TemplateId { name, args } => {
            let resolved_args = args
                .iter()
                .map(|a| {
                    template_arg_node_to_argument(ast, a)
                        .ok_or_else(|| CoreError::UnboundParameter(resolved_name(ctx, name)))
                })
                .collect::<CoreResult<Vec<_>>>()?;
            instantiate_class_template(ctx, ast, name, resolved_args, false)
        }
        other => Err(CoreError::InternalInvariant(format!(
            "type did not resolve to a concrete type after substitution: {:?}",
            other
        ))),
    }
}

/// Unwraps pointer/reference wrappers and resolves the innermost type to a
/// concrete registry entry.
fn resolve_member_type(
    ctx: &mut CompilationContext,
    ast: &mut AstArena,
    ty: TypeId,
) -> CoreResult<(TypeIndex, u8, bool, RefQualifier)> {
    let mut pointer_depth = 0u8;
    let mut is_reference = false;
    let mut ref_qualifier = RefQualifier::None;
    let mut current = ty;
    loop {
        match ast.ty(current).clone() {
            TypeNode::Pointer(inner, _cv) => {
                pointer_depth += 1;
                current = inner;
            }
            TypeNode::Reference(inner, rq) => {
                is_reference = true;
                ref_qualifier = rq;
                current = inner;
            }
            _ => break,
        }
    }
    let base_index = resolve_base_type_index(ctx, ast, current)?;
    Ok((base_index, pointer_depth, is_reference, ref_qualifier))
}

fn const_eval_bool(ast: &AstArena, expr: cpp_ast::ExprId) -> Option<bool> {
    match ast.expr(expr) {
        Expr::BoolLiteral(v) => Some(*v),
        Expr::IntLiteral(v) => Some(*v != 0),
        _ => None,
    }
}

/// Builds the laid-out `StructInfo` for one struct pattern under a given
/// substitution and attaches it to `type_index` (already registered by the
/// caller, so that recursive self-reference through a pointer/reference
/// member resolves to a real, if not-yet-finalized, index).
fn build_instantiated_struct(
    ctx: &mut CompilationContext,
    ast: &mut AstArena,
    struct_id: StructId,
    subst: &SubstitutionMap,
    type_index: TypeIndex,
    qualified_name: StringHandle,
    force_eager: bool,
) -> CoreResult<()> {
    let decl: StructDecl = ast.strukt(struct_id).clone();
    let has_vtable = decl.methods.iter().any(|fid| ast.function(*fid).flags.is_virtual);
    let mut info = StructInfo::new(convert_flags(&decl.flags, has_vtable));

    for base in &decl.bases {
        let substituted = substitute_ty(ctx, ast, base.ty, subst)?;
        let base_index = resolve_base_type_index(ctx, ast, substituted)?;
        info.base_classes.push(BaseClassInfo {
            type_index: base_index,
            access: base.access,
            is_virtual: base.is_virtual,
        });
    }

    for field_id in &decl.fields {
        let field = ast.field(*field_id).clone();
        let substituted = substitute_ty(ctx, ast, field.ty, subst)?;
        let (base_index, pointer_depth, is_reference, reference_qualifier) =
            resolve_member_type(ctx, ast, substituted)?;

        let (byte_size, alignment) = if pointer_depth > 0 || is_reference {
            (8, 8)
        } else {
            let member_type = ctx.types.get(base_index).ok_or_else(|| {
                CoreError::InternalInvariant(format!("unknown member type {:?}", base_index))
            })?;
            ((member_type.size_in_bits + 7) / 8, member_type.alignment)
        };

        let bitfield_width = match field.bitfield_width {
            Some(expr_id) => {
                let substituted = substitute_ex(ctx, ast, expr_id, subst)?;
                let value = match ast.expr(substituted) {
                    Expr::IntLiteral(v) => Some(*v as u32),
                    _ => None,
                }
                    .ok_or_else(|| CoreError::TemplateArgMismatch {
                        template: resolved_name(ctx, qualified_name),
                        reason: "bitfield width did not reduce to a constant".to_string(),
                    })?;
                Some(value)
            }
            None => None,
        };

        if field.is_static {
            if let Some(name) = field.name {
                info.static_members.push(StaticMember { name, type_index: base_index });
            }
        }

        info.members.push(StructMember {
            name: field.name,
            type_index: base_index,
            byte_size,
            alignment,
            offset: 0,
            access: field.access,
            is_reference,
            reference_qualifier,
            pointer_depth,
            bitfield_width,
            bitfield_bit_offset: None,
            is_static: field.is_static,
        });
    }

    for function_id in &decl.methods {
        let func: FunctionDecl = ast.function(*function_id).clone();
        let eager = force_eager
            || ctx.config.eager_member_functions
            || func.flags.is_constructor
            || func.flags.is_destructor
            || func.flags.is_virtual;

        let declaration = if eager {
            instantiate_member_function(ctx, ast, &func, subst, qualified_name)?
        } else {
            ctx.templates.register_lazy_member(LazyInstantiationJob {
                owner_type: type_index,
                member_function: *function_id,
                substitution: subst_to_pairs(subst),
            });
            *function_id
        };

        info.member_functions.push(MemberFunction {
            name: func.name,
            declaration,
            access: func.access,
            is_virtual: func.flags.is_virtual,
            is_pure_virtual: func.flags.is_pure_virtual,
            is_override: func.flags.is_override,
            is_final: func.flags.is_final,
            is_const_method: func.flags.is_const_method,
            is_constructor: func.flags.is_constructor,
            is_destructor: func.flags.is_destructor,
            is_operator_overload: func.flags.is_operator_overload,
            vtable_index: func.vtable_index,
        });
    }

    for nested_id in &decl.nested_classes {
        let nested = ast.strukt(*nested_id).clone();
        let nested_qualified = mint_nested_name(ctx, qualified_name, nested.name);
        let nested_index = ctx.types.add_type_unchecked(nested_qualified, TypeKind::Struct, 0);
        build_instantiated_struct(ctx, ast, *nested_id, subst, nested_index, nested_qualified, force_eager)?;
    }

    for (alias_name, target) in &decl.type_aliases {
        let substituted = substitute_ty(ctx, ast, *target, subst)?;
        ctx.types.register_type_alias(type_index, *alias_name, substituted)?;
    }

    for assertion in &decl.static_asserts {
        let substituted = substitute_ex(ctx, ast, assertion.condition, subst)?;
        if const_eval_bool(ast, substituted) == Some(false) {
            let message = assertion
                .message
                .and_then(|h| ctx.interner.resolve(h))
                .unwrap_or_else(|| "static assertion failed".to_string());
            ctx.diagnostics.emit(Diagnostic::error(
                "static-assert",
                format!("{}: {}", resolved_name(ctx, qualified_name), message),
                Span::unknown(),
            ));
        }
    }

    info.finalize_with_bases(type_index, &ctx.types).map_err(|e| CoreError::LayoutError {
        type_name: resolved_name(ctx, qualified_name),
        reason: e.to_string(),
    })?;
    ctx.types.set_struct_info(type_index, info)?;
    Ok(())
}

fn convert_flags(ast_flags: &cpp_ast::StructFlags, has_vtable: bool) -> crate::types::StructFlags {
    crate::types::StructFlags {
        is_union: ast_flags.is_union,
        is_abstract: ast_flags.is_abstract,
        is_final: ast_flags.is_final,
        has_vtable,
        pack_alignment: ast_flags.pack_alignment,
        has_deleted_default_ctor: false,
    }
}

fn mint_nested_name(ctx: &CompilationContext, outer: StringHandle, inner: StringHandle) -> StringHandle {
    let outer_str = ctx.interner.resolve(outer).unwrap_or_else(|| format!("T{}", outer.0));
    let inner_str = ctx.interner.resolve(inner).unwrap_or_else(|| format!("T{}", inner.0));
    ctx.interner.intern(&format!("{}::{}", outer_str, inner_str))
}

fn subst_to_pairs(subst: &SubstitutionMap) -> Vec<(StringHandle, TemplateArgument)> {
    subst.scalar_pairs().collect()
}

fn instantiate_member_function(
    ctx: &mut CompilationContext,
    ast: &mut AstArena,
    func: &FunctionDecl,
    subst: &SubstitutionMap,
    qualified_name: StringHandle,
) -> CoreResult<cpp_ast::FunctionId> {
    let return_type = match func.return_type {
        Some(ty) => Some(substitute_ty(ctx, ast, ty, subst)?),
        None => None,
    };
    let mut params = Vec::with_capacity(func.params.len());
    for param_id in &func.params {
        let param: ParamDecl = ast.param(*param_id).clone();
        let ty = substitute_ty(ctx, ast, param.ty, subst)?;
        params.push(ast.alloc_param(ParamDecl { name: param.name, ty }));
    }

    let instantiated = FunctionDecl {
        name: func.name,
        parent_struct: Some(qualified_name),
        type_params: Vec::new(),
        where_clause: Vec::new(),
        receiver: func.receiver,
        params,
        return_type,
        // Statement-level substitution belongs to the lowering stage, which
        // consumes the pattern body directly; carrying a pointer to it here
        // would require a statement substitutor this module doesn't have.
        body: func.body,
        access: func.access,
        linkage: func.linkage,
        flags: func.flags,
        vtable_index: func.vtable_index,
    };
    Ok(ast.alloc_function(instantiated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::template_registry::PrimaryTemplate;
    use cpp_ast::{Access, FieldDecl, FunctionFlags, Linkage};

    fn intern(ctx: &CompilationContext, s: &str) -> StringHandle {
        ctx.interner.intern(s)
    }

    #[test]
    fn instantiating_a_simple_struct_lays_out_one_member() {
        let mut ctx = CompilationContext::default();
        let mut ast = AstArena::new();

        let t_param = ast.alloc_template_param(cpp_ast::TemplateParam {
            name: intern(&ctx, "T"),
            kind: cpp_ast::TemplateParamKind::Type,
            is_variadic: false,
            default: None,
        });
        let field_ty = ast.alloc_type(TypeNode::TemplateParamRef(intern(&ctx, "T")));
        let field = ast.alloc_field(FieldDecl {
            name: Some(intern(&ctx, "value")),
            ty: field_ty,
            access: Access::Public,
            is_static: false,
            bitfield_width: None,
            default_initializer: None,
        });
        let struct_id = ast.alloc_struct(StructDecl {
            name: intern(&ctx, "Box"),
            type_params: vec![t_param],
            bases: Vec::new(),
            fields: vec![field],
            methods: Vec::new(),
            nested_classes: Vec::new(),
            static_asserts: Vec::new(),
            type_aliases: Vec::new(),
            flags: cpp_ast::StructFlags::default(),
        });
        let name = intern(&ctx, "Box");
        ctx.templates.register_primary(
            name,
            PrimaryTemplate { ast: TemplateAst::Struct(struct_id), type_params: vec![t_param] },
        );

        let args = vec![TemplateArgument::concrete_type(ctx.prelude.i32)];
        let idx = instantiate_class_template(&mut ctx, &mut ast, name, args, false).unwrap();

        let info = ctx.types.get(idx).unwrap().struct_info.as_ref().unwrap();
        assert_eq!(info.members.len(), 1);
        assert_eq!(info.members[0].type_index, ctx.prelude.i32);
        assert_eq!(info.total_size, 4);
    }

    #[test]
    fn repeated_instantiation_with_the_same_args_hits_the_cache() {
        let mut ctx = CompilationContext::default();
        let mut ast = AstArena::new();
        let struct_id = ast.alloc_struct(StructDecl {
            name: intern(&ctx, "Empty"),
            type_params: vec![],
            bases: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            nested_classes: Vec::new(),
            static_asserts: Vec::new(),
            type_aliases: Vec::new(),
            flags: cpp_ast::StructFlags::default(),
        });
        let name = intern(&ctx, "Empty");
        ctx.templates.register_primary(name, PrimaryTemplate { ast: TemplateAst::Struct(struct_id), type_params: vec![] });

        let first = instantiate_class_template(&mut ctx, &mut ast, name, vec![], false).unwrap();
        let second = instantiate_class_template(&mut ctx, &mut ast, name, vec![], false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn crtp_self_reference_through_a_base_is_deferred_not_infinite() {
        // `struct Derived : Base<Derived>` — instantiating `Base<Derived>`
        // recurses into instantiating `Derived` again before `Derived` has
        // finished, which must come back as a harmless placeholder rather
        // than recursing forever.
        let mut ctx = CompilationContext::default();
        let mut ast = AstArena::new();

        let base_name = intern(&ctx, "Base");
        let base_t = ast.alloc_template_param(cpp_ast::TemplateParam {
            name: intern(&ctx, "T"),
            kind: cpp_ast::TemplateParamKind::Type,
            is_variadic: false,
            default: None,
        });
        let base_struct = ast.alloc_struct(StructDecl {
            name: base_name,
            type_params: vec![base_t],
            bases: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            nested_classes: Vec::new(),
            static_asserts: Vec::new(),
            type_aliases: Vec::new(),
            flags: cpp_ast::StructFlags::default(),
        });
        ctx.templates.register_primary(base_name, PrimaryTemplate { ast: TemplateAst::Struct(base_struct), type_params: vec![base_t] });

        let derived_name = intern(&ctx, "Derived");
        let base_of_derived_ty = ast.alloc_type(TypeNode::TemplateId {
            name: base_name,
            args: vec![TemplateArgNode::Type(ast.alloc_type(TypeNode::Named(derived_name)))],
        });
        let derived_struct = ast.alloc_struct(StructDecl {
            name: derived_name,
            type_params: vec![],
            bases: vec![cpp_ast::BaseSpec { ty: base_of_derived_ty, access: Access::Public, is_virtual: false }],
            fields: Vec::new(),
            methods: Vec::new(),
            nested_classes: Vec::new(),
            static_asserts: Vec::new(),
            type_aliases: Vec::new(),
            flags: cpp_ast::StructFlags::default(),
        });
        ctx.templates.register_primary(derived_name, PrimaryTemplate { ast: TemplateAst::Struct(derived_struct), type_params: vec![] });
        // Resolve `Named("Derived")` the way a real pipeline would once the
        // type is first seen.
        ctx.types.add_type(derived_name, TypeKind::Struct, 0).ok();

        let result = instantiate_class_template(&mut ctx, &mut ast, derived_name, vec![], false);
        assert!(result.is_ok());
    }

    #[test]
    fn constructors_are_always_instantiated_eagerly() {
        let mut ctx = CompilationContext::default();
        let mut ast = AstArena::new();
        let ctor = ast.alloc_function(FunctionDecl {
            name: intern(&ctx, "Widget"),
            parent_struct: Some(intern(&ctx, "Widget")),
            type_params: vec![],
            where_clause: vec![],
            receiver: None,
            params: vec![],
            return_type: None,
            body: None,
            access: Access::Public,
            linkage: Linkage::Cpp,
            flags: FunctionFlags { is_constructor: true, ..Default::default() },
            vtable_index: None,
        });
        let struct_id = ast.alloc_struct(StructDecl {
            name: intern(&ctx, "Widget"),
            type_params: vec![],
            bases: Vec::new(),
            fields: Vec::new(),
            methods: vec![ctor],
            nested_classes: Vec::new(),
            static_asserts: Vec::new(),
            type_aliases: Vec::new(),
            flags: cpp_ast::StructFlags::default(),
        });
        let name = intern(&ctx, "Widget");
        ctx.templates.register_primary(name, PrimaryTemplate { ast: TemplateAst::Struct(struct_id), type_params: vec![] });

        let idx = instantiate_class_template(&mut ctx, &mut ast, name, vec![], false).unwrap();
        let info = ctx.types.get(idx).unwrap().struct_info.as_ref().unwrap();
        assert_eq!(info.member_functions.len(), 1);
        assert!(info.member_functions[0].is_constructor);
        // Eagerly substituted: the declaration is a freshly allocated copy,
        // distinct from the pattern's own `FunctionId`.
        assert_ne!(info.member_functions[0].declaration, ctor);
    }
}
