//! `TemplateRegistry` (spec §4.3): registration and lookup of primary
//! templates, partial/full specializations, alias templates, and concepts,
//! plus the instantiation cache and the explicit lazy-member job queue
//! (§4.3 [NEW], replacing the saved-lexer-position pattern with a job
//! queue per the design note in §9).

use crate::types::{TemplateArgument, TypeIndex, TypeRegistry};
use cpp_ast::{AstArena, ExprId, FunctionId, StringHandle, StructId, TemplateArgNode, TemplateParam, TemplateParamId, TypeNode};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateAst {
    Struct(StructId),
    Function(FunctionId),
}

#[derive(Debug, Clone)]
pub struct PrimaryTemplate {
    pub ast: TemplateAst,
    pub type_params: Vec<TemplateParamId>,
}

#[derive(Debug, Clone)]
pub struct Specialization {
    pub ast: TemplateAst,
    pub own_params: Vec<TemplateParamId>,
    pub pattern_args: Vec<TemplateArgNode>,
}

#[derive(Debug, Clone)]
pub struct AliasTemplate {
    pub type_params: Vec<TemplateParamId>,
    pub target: cpp_ast::TypeId,
}

#[derive(Debug, Clone)]
pub struct ConceptDecl {
    pub type_params: Vec<TemplateParamId>,
    pub constraint: ExprId,
}

/// Cache key for a completed (or in-progress) instantiation: the base
/// template's qualified name plus its fully-resolved argument vector
/// (spec §4.5 step 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstantiationKey {
    pub template_name: StringHandle,
    pub args: Vec<TemplateArgument>,
}

/// A member function whose body substitution has been deferred (spec
/// §4.5's lazy/eager member-function split), modeled as an explicit job
/// rather than a saved lexer position.
#[derive(Debug, Clone)]
pub struct LazyInstantiationJob {
    pub owner_type: TypeIndex,
    pub member_function: FunctionId,
    pub substitution: Vec<(StringHandle, TemplateArgument)>,
}

#[derive(Debug, Default)]
pub struct TemplateRegistry {
    primaries: HashMap<StringHandle, PrimaryTemplate>,
    specializations: HashMap<StringHandle, Vec<Specialization>>,
    alias_registry: HashMap<StringHandle, AliasTemplate>,
    concept_registry: HashMap<StringHandle, ConceptDecl>,
    instantiations: HashMap<InstantiationKey, TypeIndex>,
    function_instantiations: HashMap<InstantiationKey, FunctionId>,
    deferred_jobs: Vec<LazyInstantiationJob>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_primary(&mut self, name: StringHandle, primary: PrimaryTemplate) {
        self.primaries.insert(name, primary);
    }

    pub fn register_specialization(&mut self, name: StringHandle, spec: Specialization) {
        self.specializations.entry(name).or_default().push(spec);
    }

    pub fn register_alias_template(&mut self, name: StringHandle, alias: AliasTemplate) {
        self.alias_registry.insert(name, alias);
    }

    pub fn lookup_alias_template(&self, name: StringHandle) -> Option<&AliasTemplate> {
        self.alias_registry.get(&name)
    }

    pub fn is_alias_template(&self, name: StringHandle) -> bool {
        self.alias_registry.contains_key(&name)
    }

    pub fn register_concept(&mut self, name: StringHandle, decl: ConceptDecl) {
        self.concept_registry.insert(name, decl);
    }

    pub fn is_concept(&self, name: StringHandle) -> bool {
        self.concept_registry.contains_key(&name)
    }

    pub fn lookup_concept(&self, name: StringHandle) -> Option<&ConceptDecl> {
        self.concept_registry.get(&name)
    }

    pub fn lookup_template(&self, name: StringHandle) -> Option<&PrimaryTemplate> {
        self.primaries.get(&name)
    }

    pub fn lookup_all_templates(&self, name: StringHandle) -> Vec<TemplateAst> {
        let mut all = Vec::new();
        if let Some(primary) = self.primaries.get(&name) {
            all.push(primary.ast);
        }
        if let Some(specs) = self.specializations.get(&name) {
            all.extend(specs.iter().map(|s| s.ast));
        }
        all
    }

    pub fn specializations_of(&self, name: StringHandle) -> &[Specialization] {
        self.specializations.get(&name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A full (explicit) specialization: one with no parameters of its own,
    /// whose pattern resolves to exactly `args` once its literal structure
    /// is read off directly (no deduction needed).
    pub fn lookup_exact_specialization<'a>(
        &'a self,
        name: StringHandle,
        args: &[TemplateArgument],
        ast: &AstArena,
        registry: &TypeRegistry,
    ) -> Option<&'a Specialization> {
        self.specializations.get(&name)?.iter().find(|spec| {
            spec.own_params.is_empty()
                && unify_pattern_list(&spec.pattern_args, args, ast, registry, &[]).is_some()
        })
    }

    /// Returns the most-specialized partial specialization matching `args`,
    /// plus the parameter→argument bindings produced by unification (spec
    /// §4.3). Ties are broken by the ISO "more specialized than" partial
    /// order (spec.md §4.3, resolved concretely in §9 open question 2).
    pub fn match_specialization_pattern(
        &self,
        name: StringHandle,
        args: &[TemplateArgument],
        ast: &AstArena,
        registry: &TypeRegistry,
    ) -> Option<(&Specialization, HashMap<StringHandle, TemplateArgument>)> {
        let candidates = self.specializations.get(&name)?;
        let mut matches: Vec<(&Specialization, HashMap<StringHandle, TemplateArgument>)> = candidates
            .iter()
            .filter_map(|spec| {
                unify_pattern_list(&spec.pattern_args, args, ast, registry, &spec.own_params)
                    .map(|bindings| (spec, bindings))
            })
            .collect();

        if matches.is_empty() {
            return None;
        }
        if matches.len() == 1 {
            return matches.pop();
        }

        // Keep only specializations not dominated by a more-specialized
        // sibling; the spec's tie-break is a partial order, so the result
        // is the (assumed unique) maximal element.
        let most_specialized = matches.iter().enumerate().find(|(i, (candidate, _))| {
            matches.iter().enumerate().all(|(j, (other, _))| {
                *i == j || is_more_specialized(candidate, other, ast)
            })
        });
        most_specialized.map(|(i, _)| matches.remove(i))
    }

    pub fn get_instantiation(&self, key: &InstantiationKey) -> Option<TypeIndex> {
        self.instantiations.get(key).copied()
    }

    pub fn register_instantiation(&mut self, key: InstantiationKey, type_index: TypeIndex) {
        self.instantiations.insert(key, type_index);
    }

    pub fn get_function_instantiation(&self, key: &InstantiationKey) -> Option<FunctionId> {
        self.function_instantiations.get(key).copied()
    }

    pub fn register_function_instantiation(&mut self, key: InstantiationKey, function_id: FunctionId) {
        self.function_instantiations.insert(key, function_id);
    }

    pub fn register_lazy_member(&mut self, job: LazyInstantiationJob) {
        self.deferred_jobs.push(job);
    }

    pub fn drain_ready_jobs(&mut self) -> Vec<LazyInstantiationJob> {
        std::mem::take(&mut self.deferred_jobs)
    }

    /// Pulls every deferred job belonging to `owner_type` out of the queue
    /// for immediate instantiation (explicit-instantiation `force_eager`).
    pub fn force_eager(&mut self, owner_type: TypeIndex) -> Vec<LazyInstantiationJob> {
        let mut ready = Vec::new();
        let mut rest = Vec::new();
        for job in self.deferred_jobs.drain(..) {
            if job.owner_type == owner_type {
                ready.push(job);
            } else {
                rest.push(job);
            }
        }
        self.deferred_jobs = rest;
        ready
    }
}

fn is_pack_param_ref(node: &TemplateArgNode, ast: &AstArena, own_params: &[TemplateParamId]) -> Option<StringHandle> {
    if let TemplateArgNode::Type(ty) = node {
        if let TypeNode::TemplateParamRef(name) = ast.ty(*ty) {
            let is_variadic = own_params
                .iter()
                .any(|p| ast.template_param(*p).name == *name && ast.template_param(*p).is_variadic);
            if is_variadic {
                return Some(*name);
            }
        }
    }
    None
}

/// Unifies a pattern's argument list against a concrete, fully-resolved
/// argument vector, producing the bindings for the pattern's own
/// parameters, or `None` if the shapes are incompatible.
fn unify_pattern_list(
    pattern_args: &[TemplateArgNode],
    concrete_args: &[TemplateArgument],
    ast: &AstArena,
    registry: &TypeRegistry,
    own_params: &[TemplateParamId],
) -> Option<HashMap<StringHandle, TemplateArgument>> {
    let mut bindings = HashMap::new();
    let mut ci = 0usize;
    for (pi, pattern) in pattern_args.iter().enumerate() {
        if let Some(pack_name) = is_pack_param_ref(pattern, ast, own_params) {
            if pi != pattern_args.len() - 1 {
                return None;
            }
            let remaining = concrete_args.get(ci..)?.to_vec();
            bindings.insert(pack_name, TemplateArgument::pack(remaining));
            ci = concrete_args.len();
            continue;
        }
        let concrete = concrete_args.get(ci)?;
        if !unify_node(pattern, concrete, ast, registry, &mut bindings) {
            return None;
        }
        ci += 1;
    }
    if ci != concrete_args.len() {
        return None;
    }
    Some(bindings)
}

fn unify_node(
    pattern: &TemplateArgNode,
    concrete: &TemplateArgument,
    ast: &AstArena,
    registry: &TypeRegistry,
    bindings: &mut HashMap<StringHandle, TemplateArgument>,
) -> bool {
    use crate::types::TemplateArgKind;
    match pattern {
        TemplateArgNode::Type(ty) => unify_type_node(*ty, concrete, ast, registry, bindings),
        TemplateArgNode::Expr(expr) => match ast.expr(*expr) {
            cpp_ast::Expr::TemplateParamRef(name) => bind_consistent(bindings, *name, concrete.clone()),
            cpp_ast::Expr::IntLiteral(literal) => {
                matches!(&concrete.kind, TemplateArgKind::Value { value, .. } if value == literal)
            }
            _ => false,
        },
        TemplateArgNode::Pack(items) => {
            if let TemplateArgKind::Pack(members) = &concrete.kind {
                items.len() == members.len()
                    && items
                        .iter()
                        .zip(members.iter())
                        .all(|(item, member)| unify_value_like(item, member, ast, registry, bindings))
            } else {
                false
            }
        }
    }
}

fn unify_value_like(
    pattern: &TemplateArgNode,
    concrete: &TemplateArgument,
    ast: &AstArena,
    registry: &TypeRegistry,
    bindings: &mut HashMap<StringHandle, TemplateArgument>,
) -> bool {
    unify_node(pattern, concrete, ast, registry, bindings)
}

fn unify_type_node(
    ty: cpp_ast::TypeId,
    concrete: &TemplateArgument,
    ast: &AstArena,
    registry: &TypeRegistry,
    bindings: &mut HashMap<StringHandle, TemplateArgument>,
) -> bool {
    use crate::types::TemplateArgKind;
    match ast.ty(ty) {
        TypeNode::TemplateParamRef(name) => bind_consistent(bindings, *name, concrete.clone()),
        TypeNode::Named(name) => match &concrete.kind {
            TemplateArgKind::Type {
                type_index: Some(idx),
                pointer_depth: 0,
                ..
            } => registry.get(*idx).map(|info| info.name == *name).unwrap_or(false),
            _ => false,
        },
        TypeNode::Pointer(inner, _) => match &concrete.kind {
            TemplateArgKind::Type { pointer_depth, .. } if *pointer_depth > 0 => {
                let mut reduced = concrete.clone();
                if let TemplateArgKind::Type { pointer_depth, .. } = &mut reduced.kind {
                    *pointer_depth -= 1;
                }
                unify_type_node(*inner, &reduced, ast, registry, bindings)
            }
            _ => false,
        },
        TypeNode::Reference(inner, rq) => match &concrete.kind {
            TemplateArgKind::Type { ref_qualifier, .. } if ref_qualifier == rq => {
                unify_type_node(*inner, concrete, ast, registry, bindings)
            }
            _ => false,
        },
        TypeNode::TemplateId { name, args } => match &concrete.kind {
            TemplateArgKind::Type {
                type_index: Some(idx),
                ..
            } => {
                let info = match registry.get(*idx) {
                    Some(info) => info,
                    None => return false,
                };
                let inst = match &info.template_instantiation_info {
                    Some(inst) => inst,
                    None => return false,
                };
                inst.base_template_name == *name
                    && inst.args.len() == args.len()
                    && args
                        .iter()
                        .zip(inst.args.iter())
                        .all(|(p, c)| unify_node(p, c, ast, registry, bindings))
            }
            _ => false,
        },
        _ => false,
    }
}

fn bind_consistent(bindings: &mut HashMap<StringHandle, TemplateArgument>, name: StringHandle, value: TemplateArgument) -> bool {
    match bindings.get(&name) {
        Some(existing) => *existing == value,
        None => {
            bindings.insert(name, value);
            true
        }
    }
}

/// Structural approximation of the ISO "more specialized than" partial
/// order: `candidate` wins over `other` if every argument of `other`'s
/// pattern unifies into the shape of `candidate`'s pattern (treating
/// `candidate`'s own template-parameter references as free variables) and
/// not the other way around.
fn is_more_specialized(candidate: &Specialization, other: &Specialization, ast: &AstArena) -> bool {
    let forward = pattern_list_unifies_into(&candidate.pattern_args, &other.pattern_args, ast);
    let backward = pattern_list_unifies_into(&other.pattern_args, &candidate.pattern_args, ast);
    forward && !backward
}

fn pattern_list_unifies_into(general: &[TemplateArgNode], specific: &[TemplateArgNode], ast: &AstArena) -> bool {
    if general.is_empty() && specific.is_empty() {
        return true;
    }
    let general_is_pack_tail = general
        .last()
        .map(|n| matches!(n, TemplateArgNode::Type(ty) if matches!(ast.ty(*ty), TypeNode::TemplateParamRef(_))))
        .unwrap_or(false)
        && general.len() == 1;
    if general_is_pack_tail {
        // A lone variadic pattern parameter absorbs any shape.
        return true;
    }
    if general.len() != specific.len() {
        return false;
    }
    general
        .iter()
        .zip(specific.iter())
        .all(|(g, s)| node_unifies_into(g, s, ast))
}

fn node_unifies_into(general: &TemplateArgNode, specific: &TemplateArgNode, ast: &AstArena) -> bool {
    match (general, specific) {
        (TemplateArgNode::Type(g), TemplateArgNode::Type(s)) => type_node_unifies_into(*g, *s, ast),
        (TemplateArgNode::Expr(g), TemplateArgNode::Expr(s)) => match (ast.expr(*g), ast.expr(*s)) {
            (cpp_ast::Expr::TemplateParamRef(_), _) => true,
            (cpp_ast::Expr::IntLiteral(a), cpp_ast::Expr::IntLiteral(b)) => a == b,
            _ => false,
        },
        (TemplateArgNode::Pack(g), TemplateArgNode::Pack(s)) => {
            g.len() == s.len() && g.iter().zip(s.iter()).all(|(a, b)| node_unifies_into(a, b, ast))
        }
        _ => false,
    }
}

fn type_node_unifies_into(general: cpp_ast::TypeId, specific: cpp_ast::TypeId, ast: &AstArena) -> bool {
    match ast.ty(general) {
        TypeNode::TemplateParamRef(_) => true,
        TypeNode::Named(gname) => matches!(ast.ty(specific), TypeNode::Named(sname) if sname == gname),
        TypeNode::Pointer(ginner, _) => {
            matches!(ast.ty(specific), TypeNode::Pointer(sinner, _) if type_node_unifies_into(*ginner, *sinner, ast))
        }
        TypeNode::Reference(ginner, grq) => {
            matches!(ast.ty(specific), TypeNode::Reference(sinner, srq) if srq == grq && type_node_unifies_into(*ginner, *sinner, ast))
        }
        TypeNode::TemplateId { name: gname, args: gargs } => match ast.ty(specific) {
            TypeNode::TemplateId { name: sname, args: sargs } => {
                gname == sname
                    && gargs.len() == sargs.len()
                    && gargs.iter().zip(sargs.iter()).all(|(a, b)| node_unifies_into(a, b, ast))
            }
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeKind, TypeRegistry};
    use cpp_ast::{AstArena, StringHandle, TemplateParamDefault, TemplateParamKind};

    fn h(n: u32) -> StringHandle {
        StringHandle(n)
    }

    #[test]
    fn exact_specialization_with_no_params_matches_literal_args() {
        let mut ast = AstArena::new();
        let mut registry = TypeRegistry::new();
        let int_idx = registry.add_type(h(10), TypeKind::Int { bits: 32, signed: true }, 32).unwrap();

        let named_ty = ast.alloc_type(TypeNode::Named(h(10)));
        let struct_id = ast.alloc_struct(cpp_ast::StructDecl {
            name: h(0),
            type_params: vec![],
            bases: vec![],
            fields: vec![],
            methods: vec![],
            nested_classes: vec![],
            static_asserts: vec![],
            type_aliases: vec![],
            flags: cpp_ast::StructFlags::default(),
        });

        let mut registry_ty = TemplateRegistry::new();
        registry_ty.register_specialization(
            h(0),
            Specialization {
                ast: TemplateAst::Struct(struct_id),
                own_params: vec![],
                pattern_args: vec![TemplateArgNode::Type(named_ty)],
            },
        );

        let args = vec![TemplateArgument::concrete_type(int_idx)];
        assert!(registry_ty
            .lookup_exact_specialization(h(0), &args, &ast, &registry)
            .is_some());
    }

    #[test]
    fn variadic_tail_pattern_binds_remaining_args_as_pack() {
        let mut ast = AstArena::new();
        let registry = TypeRegistry::new();

        let head_param = ast.alloc_template_param(TemplateParam {
            name: h(1),
            kind: TemplateParamKind::Type,
            is_variadic: false,
            default: None,
        });
        let tail_param = ast.alloc_template_param(TemplateParam {
            name: h(2),
            kind: TemplateParamKind::Type,
            is_variadic: true,
            default: None,
        });
        let head_ref = ast.alloc_type(TypeNode::TemplateParamRef(h(1)));
        let tail_ref = ast.alloc_type(TypeNode::TemplateParamRef(h(2)));

        let struct_id = ast.alloc_struct(cpp_ast::StructDecl {
            name: h(0),
            type_params: vec![],
            bases: vec![],
            fields: vec![],
            methods: vec![],
            nested_classes: vec![],
            static_asserts: vec![],
            type_aliases: vec![],
            flags: cpp_ast::StructFlags::default(),
        });

        let mut reg = TemplateRegistry::new();
        reg.register_specialization(
            h(0),
            Specialization {
                ast: TemplateAst::Struct(struct_id),
                own_params: vec![head_param, tail_param],
                pattern_args: vec![TemplateArgNode::Type(head_ref), TemplateArgNode::Type(tail_ref)],
            },
        );

        let args = vec![
            TemplateArgument::value(1, None),
            TemplateArgument::value(2, None),
            TemplateArgument::value(3, None),
        ];
        let (spec, bindings) = reg.match_specialization_pattern(h(0), &args, &ast, &registry).unwrap();
        assert!(matches!(spec.ast, TemplateAst::Struct(_)));
        assert_eq!(bindings.get(&h(1)), Some(&TemplateArgument::value(1, None)));
        match bindings.get(&h(2)).unwrap().kind.clone() {
            crate::types::TemplateArgKind::Pack(members) => assert_eq!(members.len(), 2),
            _ => panic!("expected pack binding"),
        }
    }

    #[test]
    fn lazy_jobs_can_be_forced_eager_by_owner() {
        let mut reg = TemplateRegistry::new();
        let func_id = {
            let mut ast = AstArena::new();
            ast.alloc_function(cpp_ast::FunctionDecl {
                name: h(5),
                parent_struct: None,
                type_params: vec![],
                where_clause: vec![],
                receiver: None,
                params: vec![],
                return_type: None,
                body: None,
                access: cpp_ast::Access::Public,
                linkage: cpp_ast::Linkage::Cpp,
                flags: cpp_ast::FunctionFlags::default(),
                vtable_index: None,
            })
        };
        reg.register_lazy_member(LazyInstantiationJob {
            owner_type: TypeIndex(0),
            member_function: func_id,
            substitution: vec![],
        });
        reg.register_lazy_member(LazyInstantiationJob {
            owner_type: TypeIndex(1),
            member_function: func_id,
            substitution: vec![],
        });
        let ready = reg.force_eager(TypeIndex(0));
        assert_eq!(ready.len(), 1);
        assert_eq!(reg.drain_ready_jobs().len(), 1);
    }
}
