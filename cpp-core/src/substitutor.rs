//! `ExpressionSubstitutor` (spec §4.4): purely functional AST→AST
//! substitution of template parameters through declarations and bodies.
//! Never mutates the arena it walks — every substituted node is a fresh
//! allocation, grounded on the host compiler's `substitute_type`
//! (`codegen_ast/types.rs`), generalized from a `HashMap<String, Type>`
//! walk over an owned `Type` enum to an arena-allocating walk over `TypeId`/
//! `ExprId` handles.

use crate::errors::{CoreError, CoreResult};
use crate::template_registry::TemplateRegistry;
use crate::types::{TemplateArgKind, TemplateArgument, TypeRegistry};
use cpp_ast::{AstArena, BinaryOp, Expr, ExprId, SizeofArg, StringHandle, TemplateArgNode, TypeId, TypeNode};
use std::collections::HashMap;

/// `name → TemplateArgument` for scalar parameters and `name → Vec<…>` for
/// packs, plus the parameter order needed to resolve `sizeof...(P)`
/// consistently with declaration order (spec §4.4).
#[derive(Debug, Default, Clone)]
pub struct SubstitutionMap {
    scalars: HashMap<StringHandle, TemplateArgument>,
    packs: HashMap<StringHandle, Vec<TemplateArgument>>,
}

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_scalar(&mut self, name: StringHandle, arg: TemplateArgument) {
        self.scalars.insert(name, arg);
    }

    pub fn bind_pack(&mut self, name: StringHandle, args: Vec<TemplateArgument>) {
        self.packs.insert(name, args);
    }

    pub fn scalar(&self, name: StringHandle) -> Option<&TemplateArgument> {
        self.scalars.get(&name)
    }

    pub fn pack(&self, name: StringHandle) -> Option<&[TemplateArgument]> {
        self.packs.get(&name).map(Vec::as_slice)
    }

    /// Every scalar binding as `(name, arg)` pairs, for callers that need to
    /// snapshot a substitution rather than query it by name (e.g. a deferred
    /// member-function job replayed later).
    pub fn scalar_pairs(&self) -> impl Iterator<Item = (StringHandle, TemplateArgument)> + '_ {
        self.scalars.iter().map(|(name, arg)| (*name, arg.clone()))
    }

    /// Rebinds a single pack member as a transient scalar, for expanding a
    /// pack-expansion expression/type one element at a time.
    fn with_pack_element_as_scalar(&self, name: StringHandle, element: TemplateArgument) -> Self {
        let mut clone = self.clone();
        clone.scalars.insert(name, element);
        clone
    }
}

pub struct ExpressionSubstitutor<'a> {
    registry: &'a TypeRegistry,
    templates: &'a TemplateRegistry,
}

impl<'a> ExpressionSubstitutor<'a> {
    pub fn new(registry: &'a TypeRegistry, templates: &'a TemplateRegistry) -> Self {
        Self { registry, templates }
    }

    pub fn substitute_type(&self, arena: &mut AstArena, ty: TypeId, subst: &SubstitutionMap) -> CoreResult<TypeId> {
        let node = arena.ty(ty).clone();
        let substituted = match node {
            TypeNode::Void
            | TypeNode::Bool
            | TypeNode::Char
            | TypeNode::Int { .. }
            | TypeNode::Float { .. }
            | TypeNode::NullptrT
            | TypeNode::Auto
            | TypeNode::Never
            | TypeNode::Named(_)
            | TypeNode::Resolved(_) => return Ok(ty),
            TypeNode::TemplateParamRef(name) => return self.substitute_type_param_ref(arena, name, subst),
            TypeNode::Pointer(inner, cv) => {
                let new_inner = self.substitute_type(arena, inner, subst)?;
                TypeNode::Pointer(new_inner, cv)
            }
            TypeNode::Reference(inner, rq) => {
                let new_inner = self.substitute_type(arena, inner, subst)?;
                TypeNode::Reference(new_inner, rq)
            }
            TypeNode::Array(elem, size) => {
                let new_elem = self.substitute_type(arena, elem, subst)?;
                let new_size = size.map(|s| self.substitute_expr(arena, s, subst)).transpose()?;
                TypeNode::Array(new_elem, new_size)
            }
            TypeNode::Function {
                params,
                return_type,
                variadic,
            } => {
                let new_params = params
                    .iter()
                    .map(|p| self.substitute_type(arena, *p, subst))
                    .collect::<CoreResult<Vec<_>>>()?;
                let new_return = self.substitute_type(arena, return_type, subst)?;
                TypeNode::Function {
                    params: new_params,
                    return_type: new_return,
                    variadic,
                }
            }
            TypeNode::TemplateId { name, args } => {
                let new_args = self.substitute_template_id_args(arena, &args, subst)?;
                if self.templates.is_alias_template(name) {
                    if let Some(resolved) = self.try_expand_alias(arena, name, &new_args)? {
                        return Ok(resolved);
                    }
                }
                TypeNode::TemplateId { name, args: new_args }
            }
            TypeNode::Decltype(expr) => {
                let new_expr = self.substitute_expr(arena, expr, subst)?;
                TypeNode::Decltype(new_expr)
            }
            TypeNode::Qualified { base, member } => {
                let new_base = self.substitute_type(arena, base, subst)?;
                // Resolve `BaseTemplate<Args>::member` (the `void_t` idiom)
                // once `base` has substituted down to a concrete registry
                // entry. An unresolved member is a hard substitution failure
                // here; callers attempting the SFINAE default-fill path
                // catch this and treat it as "this candidate doesn't apply"
                // rather than aborting the whole instantiation.
                if let TypeNode::Resolved(idx) = arena.ty(new_base) {
                    let alias = self
                        .registry
                        .find_type_alias(*idx, member)
                        .ok_or_else(|| CoreError::UnresolvedName { name: format!("{:?}::{:?}", idx, member) })?;
                    return Ok(alias);
                }
                TypeNode::Qualified { base: new_base, member }
            }
            TypeNode::PackExpansion(inner) => {
                // A bare pack expansion outside an argument-list position
                // (e.g. as a standalone type) has no single substituted
                // value; callers expanding argument lists intercept
                // `PackExpansion` before recursing into this function.
                let new_inner = self.substitute_type(arena, inner, subst)?;
                TypeNode::PackExpansion(new_inner)
            }
        };
        Ok(arena.alloc_type(substituted))
    }

    fn substitute_type_param_ref(&self, arena: &mut AstArena, name: StringHandle, subst: &SubstitutionMap) -> CoreResult<TypeId> {
        let arg = subst
            .scalar(name)
            .ok_or_else(|| CoreError::UnboundParameter(format!("{:?}", name)))?;
        self.type_node_from_argument(arena, arg, name)
    }

    fn type_node_from_argument(&self, arena: &mut AstArena, arg: &TemplateArgument, name: StringHandle) -> CoreResult<TypeId> {
        match &arg.kind {
            TemplateArgKind::Type {
                type_index: Some(idx),
                pointer_depth,
                cv,
                ref_qualifier,
            } => {
                let mut node = arena.alloc_type(TypeNode::Resolved(*idx));
                for _ in 0..*pointer_depth {
                    node = arena.alloc_type(TypeNode::Pointer(node, *cv));
                }
                if *ref_qualifier != cpp_ast::RefQualifier::None {
                    node = arena.alloc_type(TypeNode::Reference(node, *ref_qualifier));
                }
                Ok(node)
            }
            TemplateArgKind::Type { type_index: None, .. } => {
                Err(CoreError::UnboundParameter(format!("{:?} is still dependent", name)))
            }
            TemplateArgKind::Value { .. } | TemplateArgKind::Pack(_) => Err(CoreError::InternalInvariant(format!(
                "{:?} substituted in a type position but bound to a non-type argument",
                name
            ))),
        }
    }

    /// Reduces a template-id naming an alias template to its substituted
    /// target, e.g. `void_t<typename T::type>` collapsing to `void` (spec
    /// §4.5's SFINAE default-fill path, generalized to every alias-template
    /// use site rather than special-cased at the call site). Returns `Ok(None)`
    /// when any argument is still structurally dependent — the `TemplateId`
    /// is left unexpanded in that case rather than erroring.
    fn try_expand_alias(&self, arena: &mut AstArena, name: StringHandle, args: &[TemplateArgNode]) -> CoreResult<Option<TypeId>> {
        let alias = self.templates.lookup_alias_template(name).ok_or_else(|| {
            CoreError::InternalInvariant(format!("{:?} reported as an alias template but has no registration", name))
        })?;
        let mut resolved_args = Vec::with_capacity(args.len());
        for arg in args {
            match template_arg_node_to_argument(arena, arg) {
                Some(a) => resolved_args.push(a),
                None => return Ok(None),
            }
        }

        let mut alias_subst = SubstitutionMap::new();
        let params = &alias.type_params;
        for (i, param_id) in params.iter().enumerate() {
            let param = arena.template_param(*param_id);
            if param.is_variadic {
                alias_subst.bind_pack(param.name, resolved_args.get(i..).map(<[_]>::to_vec).unwrap_or_default());
                break;
            }
            let name = param.name;
            match resolved_args.get(i) {
                Some(a) => alias_subst.bind_scalar(name, a.clone()),
                None => return Ok(None),
            }
        }

        let target = alias.target;
        self.substitute_type(arena, target, &alias_subst).map(Some)
    }

    pub fn substitute_expr(&self, arena: &mut AstArena, expr: ExprId, subst: &SubstitutionMap) -> CoreResult<ExprId> {
        let node = arena.expr(expr).clone();
        let substituted = match node {
            Expr::IntLiteral(_)
            | Expr::FloatLiteral(_)
            | Expr::BoolLiteral(_)
            | Expr::StringLiteral(_)
            | Expr::NullptrLiteral
            | Expr::Ident(_)
            | Expr::This => return Ok(expr),
            Expr::TemplateParamRef(name) => return self.substitute_value_param_ref(arena, name, subst),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.substitute_expr(arena, lhs, subst)?;
                let rhs = self.substitute_expr(arena, rhs, subst)?;
                Expr::Binary { op, lhs, rhs }
            }
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: self.substitute_expr(arena, operand, subst)?,
            },
            Expr::Call { callee, type_args, args } => {
                let callee = self.substitute_expr(arena, callee, subst)?;
                let type_args = self.substitute_template_id_args(arena, &type_args, subst)?;
                let args = self.substitute_expr_list(arena, &args, subst)?;
                Expr::Call { callee, type_args, args }
            }
            Expr::MethodCall {
                object,
                method,
                type_args,
                args,
            } => {
                let object = self.substitute_expr(arena, object, subst)?;
                let type_args = self.substitute_template_id_args(arena, &type_args, subst)?;
                let args = self.substitute_expr_list(arena, &args, subst)?;
                Expr::MethodCall {
                    object,
                    method,
                    type_args,
                    args,
                }
            }
            Expr::MemberAccess { object, member, arrow } => Expr::MemberAccess {
                object: self.substitute_expr(arena, object, subst)?,
                member,
                arrow,
            },
            Expr::Subscript { object, index } => Expr::Subscript {
                object: self.substitute_expr(arena, object, subst)?,
                index: self.substitute_expr(arena, index, subst)?,
            },
            Expr::Cast { kind, target, operand } => Expr::Cast {
                kind,
                target: self.substitute_type(arena, target, subst)?,
                operand: self.substitute_expr(arena, operand, subst)?,
            },
            Expr::Sizeof(SizeofArg::Type(ty)) => {
                let new_ty = self.substitute_type(arena, ty, subst)?;
                if let Some(bits) = self.registry_sizeof_bits(arena, new_ty) {
                    return Ok(arena.alloc_expr(Expr::IntLiteral((bits / 8) as i64)));
                }
                Expr::Sizeof(SizeofArg::Type(new_ty))
            }
            Expr::Sizeof(SizeofArg::Expr(e)) => Expr::Sizeof(SizeofArg::Expr(self.substitute_expr(arena, e, subst)?)),
            Expr::Sizeof(SizeofArg::PackCardinality(name)) => {
                let count = subst
                    .pack(name)
                    .ok_or_else(|| CoreError::UnboundParameter(format!("{:?}", name)))?
                    .len();
                return Ok(arena.alloc_expr(Expr::IntLiteral(count as i64)));
            }
            Expr::Alignof(ty) => Expr::Alignof(self.substitute_type(arena, ty, subst)?),
            Expr::Offsetof { ty, member } => Expr::Offsetof {
                ty: self.substitute_type(arena, ty, subst)?,
                member,
            },
            Expr::TypeTrait { trait_name, type_args } => {
                let type_args = type_args
                    .iter()
                    .map(|t| self.substitute_type(arena, *t, subst))
                    .collect::<CoreResult<Vec<_>>>()?;
                Expr::TypeTrait { trait_name, type_args }
            }
            Expr::New {
                ty,
                array_size,
                placement,
                ctor_args,
            } => Expr::New {
                ty: self.substitute_type(arena, ty, subst)?,
                array_size: array_size.map(|a| self.substitute_expr(arena, a, subst)).transpose()?,
                placement: placement.map(|p| self.substitute_expr(arena, p, subst)).transpose()?,
                ctor_args: self.substitute_expr_list(arena, &ctor_args, subst)?,
            },
            Expr::Delete { operand, is_array } => Expr::Delete {
                operand: self.substitute_expr(arena, operand, subst)?,
                is_array,
            },
            Expr::AddressOf(e) => Expr::AddressOf(self.substitute_expr(arena, e, subst)?),
            Expr::Deref(e) => Expr::Deref(self.substitute_expr(arena, e, subst)?),
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => Expr::Ternary {
                condition: self.substitute_expr(arena, condition, subst)?,
                then_expr: self.substitute_expr(arena, then_expr, subst)?,
                else_expr: self.substitute_expr(arena, else_expr, subst)?,
            },
            Expr::FoldExpr {
                op,
                pack,
                init,
                is_left_fold,
            } => return self.reduce_fold(arena, op, pack, init, is_left_fold, subst),
            Expr::PackExpansion(inner) => {
                // A bare expansion with no surrounding list collapses to its
                // first expanded element; list-valued positions (call
                // arguments, base lists, initializer lists) intercept
                // `PackExpansion` in `substitute_expr_list` instead.
                let expanded = self.expand_expr(arena, inner, subst)?;
                return expanded
                    .into_iter()
                    .next()
                    .ok_or_else(|| CoreError::InternalInvariant("pack expansion over an empty pack".into()));
            }
            Expr::QualifiedDependentName { base, member } => Expr::QualifiedDependentName {
                base: self.substitute_type(arena, base, subst)?,
                member,
            },
            Expr::Lambda {
                captures,
                params,
                return_type,
                body,
            } => Expr::Lambda {
                captures,
                params,
                return_type: return_type.map(|t| self.substitute_type(arena, t, subst)).transpose()?,
                body,
            },
            Expr::Typeid(ty) => Expr::Typeid(self.substitute_type(arena, ty, subst)?),
        };
        Ok(arena.alloc_expr(substituted))
    }

    fn substitute_value_param_ref(&self, arena: &mut AstArena, name: StringHandle, subst: &SubstitutionMap) -> CoreResult<ExprId> {
        let arg = subst
            .scalar(name)
            .ok_or_else(|| CoreError::UnboundParameter(format!("{:?}", name)))?;
        match &arg.kind {
            TemplateArgKind::Value { value, .. } => Ok(arena.alloc_expr(Expr::IntLiteral(*value))),
            _ => Err(CoreError::InternalInvariant(format!(
                "{:?} substituted in a value position but bound to a non-value argument",
                name
            ))),
        }
    }

    fn registry_sizeof_bits(&self, arena: &AstArena, ty: TypeId) -> Option<u64> {
        if let TypeNode::Resolved(idx) = arena.ty(ty) {
            self.registry.get(*idx).map(|info| info.size_in_bits)
        } else {
            None
        }
    }

    /// Substitutes an argument list, expanding any `PackExpansion` entry in
    /// place (spec §4.4: "Pack expansions expanded in context").
    pub fn substitute_expr_list(&self, arena: &mut AstArena, exprs: &[ExprId], subst: &SubstitutionMap) -> CoreResult<Vec<ExprId>> {
        let mut out = Vec::with_capacity(exprs.len());
        for &e in exprs {
            if let Expr::PackExpansion(inner) = arena.expr(e) {
                out.extend(self.expand_expr(arena, *inner, subst)?);
            } else {
                out.push(self.substitute_expr(arena, e, subst)?);
            }
        }
        Ok(out)
    }

    /// Expands `inner` once per element of the (single) pack it mentions,
    /// substituting that one element as a transient scalar each time.
    fn expand_expr(&self, arena: &mut AstArena, inner: ExprId, subst: &SubstitutionMap) -> CoreResult<Vec<ExprId>> {
        let pack_name = find_expr_pack_ref(arena, inner, subst)
            .ok_or_else(|| CoreError::InternalInvariant("pack expansion does not mention a bound pack parameter".into()))?;
        let members = subst
            .pack(pack_name)
            .ok_or_else(|| CoreError::InternalInvariant(format!("pack {:?} found by its reference but not bound", pack_name)))?
            .to_vec();
        members
            .into_iter()
            .map(|member| {
                let per_element = subst.with_pack_element_as_scalar(pack_name, member);
                self.substitute_expr(arena, inner, &per_element)
            })
            .collect()
    }

    fn substitute_template_id_args(
        &self,
        arena: &mut AstArena,
        args: &[TemplateArgNode],
        subst: &SubstitutionMap,
    ) -> CoreResult<Vec<TemplateArgNode>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.extend(self.substitute_template_arg_node(arena, arg, subst)?);
        }
        Ok(out)
    }

    fn substitute_template_arg_node(
        &self,
        arena: &mut AstArena,
        node: &TemplateArgNode,
        subst: &SubstitutionMap,
    ) -> CoreResult<Vec<TemplateArgNode>> {
        match node {
            TemplateArgNode::Type(ty) => {
                if let TypeNode::PackExpansion(inner) = arena.ty(*ty).clone() {
                    let pack_name = find_type_pack_ref(arena, inner, subst).ok_or_else(|| {
                        CoreError::InternalInvariant("pack expansion does not mention a bound pack parameter".into())
                    })?;
                    let members = subst
                        .pack(pack_name)
                        .ok_or_else(|| CoreError::InternalInvariant(format!("pack {:?} found by its reference but not bound", pack_name)))?
                        .to_vec();
                    members
                        .into_iter()
                        .map(|member| {
                            let per_element = subst.with_pack_element_as_scalar(pack_name, member);
                            self.substitute_type(arena, inner, &per_element).map(TemplateArgNode::Type)
                        })
                        .collect()
                } else {
                    Ok(vec![TemplateArgNode::Type(self.substitute_type(arena, *ty, subst)?)])
                }
            }
            TemplateArgNode::Expr(e) => Ok(vec![TemplateArgNode::Expr(self.substitute_expr(arena, *e, subst)?)]),
            TemplateArgNode::Pack(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.substitute_template_arg_node(arena, item, subst)?);
                }
                Ok(vec![TemplateArgNode::Pack(out)])
            }
        }
    }

    /// Reduces `(pack OP ...)` / `(init OP ... OP pack)` fold expressions
    /// (spec §4.4). Tries a typed `i64` accumulator first; falls back to
    /// rebuilding the equivalent chain of `Binary` nodes when any pack
    /// element isn't a known integer value (§9 design note).
    fn reduce_fold(
        &self,
        arena: &mut AstArena,
        op: BinaryOp,
        pack: StringHandle,
        init: Option<ExprId>,
        is_left_fold: bool,
        subst: &SubstitutionMap,
    ) -> CoreResult<ExprId> {
        let members = subst
            .pack(pack)
            .ok_or_else(|| CoreError::UnboundParameter(format!("{:?}", pack)))?
            .to_vec();

        let init_substituted = init.map(|i| self.substitute_expr(arena, i, subst)).transpose()?;

        let all_int: Option<Vec<i64>> = members
            .iter()
            .map(|m| match &m.kind {
                TemplateArgKind::Value { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        let init_int = init_substituted.and_then(|i| literal_i64(arena, i));

        if let Some(values) = all_int {
            if init.is_none() || init_int.is_some() {
                if let Some(folded) = fold_i64_values(op, &values, init_int, is_left_fold) {
                    return Ok(arena.alloc_expr(Expr::IntLiteral(folded)));
                }
            }
        }

        // Fallback: rebuild the fold as a literal Binary chain.
        let operand_ids: Vec<ExprId> = members
            .iter()
            .map(|m| match &m.kind {
                TemplateArgKind::Value { value, .. } => arena.alloc_expr(Expr::IntLiteral(*value)),
                _ => arena.alloc_expr(Expr::IntLiteral(0)),
            })
            .collect();
        build_fold_chain(arena, op, &operand_ids, init_substituted, is_left_fold)
            .ok_or_else(|| CoreError::InternalInvariant("fold expression over an empty pack with no seed".into()))
    }
}

/// Converts an already-substituted `TemplateArgNode` into its resolved
/// `TemplateArgument` form, when it is concrete enough to do so (a
/// `Resolved` type or an integer literal). Returns `None` for anything
/// still structurally dependent.
pub(crate) fn template_arg_node_to_argument(arena: &AstArena, node: &TemplateArgNode) -> Option<TemplateArgument> {
    match node {
        TemplateArgNode::Type(ty) => match arena.ty(*ty) {
            TypeNode::Resolved(idx) => Some(TemplateArgument::concrete_type(*idx)),
            _ => None,
        },
        TemplateArgNode::Expr(e) => match arena.expr(*e) {
            Expr::IntLiteral(v) => Some(TemplateArgument::value(*v, None)),
            _ => None,
        },
        TemplateArgNode::Pack(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(template_arg_node_to_argument(arena, item)?);
            }
            Some(TemplateArgument::pack(out))
        }
    }
}

fn literal_i64(arena: &AstArena, expr: ExprId) -> Option<i64> {
    match arena.expr(expr) {
        Expr::IntLiteral(v) => Some(*v),
        Expr::BoolLiteral(b) => Some(*b as i64),
        _ => None,
    }
}

fn apply_op_i64(op: BinaryOp, a: i64, b: i64) -> i64 {
    match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                0
            } else {
                a.wrapping_div(b)
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                0
            } else {
                a.wrapping_rem(b)
            }
        }
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
        BinaryOp::LogicalAnd => ((a != 0) && (b != 0)) as i64,
        BinaryOp::LogicalOr => ((a != 0) || (b != 0)) as i64,
        BinaryOp::Eq => (a == b) as i64,
        BinaryOp::NotEq => (a != b) as i64,
        BinaryOp::Lt => (a < b) as i64,
        BinaryOp::LtEq => (a <= b) as i64,
        BinaryOp::Gt => (a > b) as i64,
        BinaryOp::GtEq => (a >= b) as i64,
    }
}

fn fold_i64_values(op: BinaryOp, values: &[i64], init: Option<i64>, is_left_fold: bool) -> Option<i64> {
    match (init, is_left_fold) {
        (Some(seed), true) => Some(values.iter().fold(seed, |acc, &v| apply_op_i64(op, acc, v))),
        (Some(seed), false) => Some(values.iter().rev().fold(seed, |acc, &v| apply_op_i64(op, v, acc))),
        (None, true) => {
            let mut it = values.iter();
            let first = *it.next()?;
            Some(it.fold(first, |acc, &v| apply_op_i64(op, acc, v)))
        }
        (None, false) => {
            let mut it = values.iter().rev();
            let last = *it.next()?;
            Some(it.fold(last, |acc, &v| apply_op_i64(op, v, acc)))
        }
    }
}

fn build_fold_chain(arena: &mut AstArena, op: BinaryOp, operands: &[ExprId], init: Option<ExprId>, is_left_fold: bool) -> Option<ExprId> {
    match (init, is_left_fold) {
        (Some(seed), true) => Some(operands.iter().fold(seed, |acc, &v| arena.alloc_expr(Expr::Binary { op, lhs: acc, rhs: v }))),
        (Some(seed), false) => Some(
            operands
                .iter()
                .rev()
                .fold(seed, |acc, &v| arena.alloc_expr(Expr::Binary { op, lhs: v, rhs: acc })),
        ),
        (None, true) => {
            let mut it = operands.iter();
            let first = *it.next()?;
            Some(it.fold(first, |acc, &v| arena.alloc_expr(Expr::Binary { op, lhs: acc, rhs: v })))
        }
        (None, false) => {
            let mut it = operands.iter().rev();
            let last = *it.next()?;
            Some(it.fold(last, |acc, &v| arena.alloc_expr(Expr::Binary { op, lhs: v, rhs: acc })))
        }
    }
}

fn find_expr_pack_ref(arena: &AstArena, expr: ExprId, subst: &SubstitutionMap) -> Option<StringHandle> {
    match arena.expr(expr) {
        Expr::TemplateParamRef(name) if subst.pack(*name).is_some() => Some(*name),
        Expr::Binary { lhs, rhs, .. } => find_expr_pack_ref(arena, *lhs, subst).or_else(|| find_expr_pack_ref(arena, *rhs, subst)),
        Expr::Unary { operand, .. } | Expr::AddressOf(operand) | Expr::Deref(operand) => find_expr_pack_ref(arena, *operand, subst),
        Expr::Cast { target, operand, .. } => find_type_pack_ref(arena, *target, subst).or_else(|| find_expr_pack_ref(arena, *operand, subst)),
        Expr::Call { callee, args, .. } => find_expr_pack_ref(arena, *callee, subst).or_else(|| args.iter().find_map(|a| find_expr_pack_ref(arena, *a, subst))),
        Expr::MethodCall { object, args, .. } => find_expr_pack_ref(arena, *object, subst).or_else(|| args.iter().find_map(|a| find_expr_pack_ref(arena, *a, subst))),
        Expr::MemberAccess { object, .. } => find_expr_pack_ref(arena, *object, subst),
        Expr::Subscript { object, index } => find_expr_pack_ref(arena, *object, subst).or_else(|| find_expr_pack_ref(arena, *index, subst)),
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => find_expr_pack_ref(arena, *condition, subst)
            .or_else(|| find_expr_pack_ref(arena, *then_expr, subst))
            .or_else(|| find_expr_pack_ref(arena, *else_expr, subst)),
        _ => None,
    }
}

fn find_type_pack_ref(arena: &AstArena, ty: TypeId, subst: &SubstitutionMap) -> Option<StringHandle> {
    match arena.ty(ty) {
        TypeNode::TemplateParamRef(name) if subst.pack(*name).is_some() => Some(*name),
        TypeNode::Pointer(inner, _) | TypeNode::Reference(inner, _) | TypeNode::PackExpansion(inner) => {
            find_type_pack_ref(arena, *inner, subst)
        }
        TypeNode::Array(inner, _) => find_type_pack_ref(arena, *inner, subst),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeKind, TypeRegistry};

    fn h(n: u32) -> StringHandle {
        StringHandle(n)
    }

    #[test]
    fn substituting_template_param_ref_produces_new_node_leaving_old_intact() {
        let mut arena = AstArena::new();
        let mut registry = TypeRegistry::new();
        let templates = TemplateRegistry::new();
        let int_idx = registry.add_type(h(1), TypeKind::Int { bits: 32, signed: true }, 32).unwrap();

        let param_ref = arena.alloc_type(TypeNode::TemplateParamRef(h(0)));
        let mut subst = SubstitutionMap::new();
        subst.bind_scalar(h(0), TemplateArgument::concrete_type(int_idx));

        let sub = ExpressionSubstitutor::new(&registry, &templates);
        let result = sub.substitute_type(&mut arena, param_ref, &subst).unwrap();

        assert_ne!(result, param_ref);
        assert!(matches!(arena.ty(param_ref), TypeNode::TemplateParamRef(_)));
        assert!(matches!(arena.ty(result), TypeNode::Resolved(idx) if *idx == int_idx));
    }

    #[test]
    fn unbound_scalar_param_fails() {
        let mut arena = AstArena::new();
        let registry = TypeRegistry::new();
        let templates = TemplateRegistry::new();
        let param_ref = arena.alloc_type(TypeNode::TemplateParamRef(h(0)));
        let subst = SubstitutionMap::new();
        let sub = ExpressionSubstitutor::new(&registry, &templates);
        let err = sub.substitute_type(&mut arena, param_ref, &subst).unwrap_err();
        assert!(matches!(err, CoreError::UnboundParameter(_)));
    }

    #[test]
    fn sizeof_pack_cardinality_reduces_to_literal() {
        let mut arena = AstArena::new();
        let registry = TypeRegistry::new();
        let templates = TemplateRegistry::new();
        let expr = arena.alloc_expr(Expr::Sizeof(SizeofArg::PackCardinality(h(0))));
        let mut subst = SubstitutionMap::new();
        subst.bind_pack(
            h(0),
            vec![
                TemplateArgument::value(1, None),
                TemplateArgument::value(2, None),
                TemplateArgument::value(3, None),
            ],
        );
        let sub = ExpressionSubstitutor::new(&registry, &templates);
        let result = sub.substitute_expr(&mut arena, expr, &subst).unwrap();
        assert!(matches!(arena.expr(result), Expr::IntLiteral(3)));
    }

    #[test]
    fn integer_fold_reduces_to_single_literal() {
        let mut arena = AstArena::new();
        let registry = TypeRegistry::new();
        let templates = TemplateRegistry::new();
        let fold = arena.alloc_expr(Expr::FoldExpr {
            op: BinaryOp::Add,
            pack: h(0),
            init: None,
            is_left_fold: true,
        });
        let mut subst = SubstitutionMap::new();
        subst.bind_pack(
            h(0),
            vec![
                TemplateArgument::value(1, None),
                TemplateArgument::value(2, None),
                TemplateArgument::value(3, None),
            ],
        );
        let sub = ExpressionSubstitutor::new(&registry, &templates);
        let result = sub.substitute_expr(&mut arena, fold, &subst).unwrap();
        assert!(matches!(arena.expr(result), Expr::IntLiteral(6)));
    }

    #[test]
    fn pack_expansion_in_call_args_expands_one_node_per_element() {
        let mut arena = AstArena::new();
        let registry = TypeRegistry::new();
        let templates = TemplateRegistry::new();
        let pack_ref = arena.alloc_expr(Expr::TemplateParamRef(h(0)));
        let expansion = arena.alloc_expr(Expr::PackExpansion(pack_ref));

        let mut subst = SubstitutionMap::new();
        subst.bind_pack(h(0), vec![TemplateArgument::value(7, None), TemplateArgument::value(8, None)]);

        let sub = ExpressionSubstitutor::new(&registry, &templates);
        let args = sub.substitute_expr_list(&mut arena, &[expansion], &subst).unwrap();
        assert_eq!(args.len(), 2);
        assert!(matches!(arena.expr(args[0]), Expr::IntLiteral(7)));
        assert!(matches!(arena.expr(args[1]), Expr::IntLiteral(8)));
    }
}
