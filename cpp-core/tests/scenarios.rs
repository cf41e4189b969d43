//! End-to-end scenarios exercising instantiation, substitution, and
//! lowering together, built directly against the public API rather than
//! through a lexer/parser (out of scope for this crate).

use cpp_ast::{
    Access, AstArena, BaseSpec, CastKind, CvQualifier, Expr, FieldDecl, FunctionDecl, FunctionFlags, FunctionId,
    Linkage, ParamDecl, Receiver, RefQualifier, StringHandle, StructDecl, StructFlags as AstStructFlags,
    TemplateArgNode, TemplateParam, TemplateParamDefault, TemplateParamKind, TypeNode,
};
use cpp_core::substitutor::{ExpressionSubstitutor, SubstitutionMap};
use cpp_core::template_registry::{PrimaryTemplate, Specialization, TemplateAst};
use cpp_core::types::{
    BaseClassInfo, MemberFunction, QualifiedType, StructFlags, StructInfo, TemplateArgument, TypeIndex, TypeKind,
};
use cpp_core::{
    instantiate_class_template, CompilationContext, EvalMode, FunctionLowering, NameMangler, Opcode,
    OverloadCandidateSource, ValueCategory,
};

/// A candidate source backed by plain vectors, good enough for every
/// scenario here: each lookup kind is wired to whatever the test set up.
#[derive(Default)]
struct FixedCandidates {
    global: Vec<FunctionId>,
    members: Vec<(TypeIndex, StringHandle, FunctionId)>,
}

impl OverloadCandidateSource for FixedCandidates {
    fn local_candidates(&self, _name: StringHandle) -> Vec<FunctionId> {
        Vec::new()
    }
    fn global_candidates(&self, _name: StringHandle) -> Vec<FunctionId> {
        self.global.clone()
    }
    fn member_candidates(&self, owner: TypeIndex, name: StringHandle) -> Vec<FunctionId> {
        self.members
            .iter()
            .filter(|(o, n, _)| *o == owner && *n == name)
            .map(|(_, _, f)| *f)
            .collect()
    }
    fn qualified_candidates(&self, _name: StringHandle) -> Vec<FunctionId> {
        Vec::new()
    }
}

fn stub_struct(ctx: &mut CompilationContext, name: &str) -> TypeIndex {
    let handle = ctx.interner.intern(name);
    let idx = ctx.types.add_type(handle, TypeKind::Struct, 0).unwrap();
    ctx.types.set_struct_info(idx, StructInfo::new(StructFlags::default())).unwrap();
    idx
}

// Scenario 1: `has_type<T, Second = T::type>` primary falls back to its
// `false_type` base when the defaulted second argument can't resolve
// `int::type`, so the `true_type` partial specialization never unifies.
#[test]
fn sfinae_default_falls_back_to_primary_when_member_is_absent() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let false_type = stub_struct(&mut ctx, "false_type");
    let true_type = stub_struct(&mut ctx, "true_type");

    let has_type = ctx.interner.intern("has_type");
    let t_name = ctx.interner.intern("T");
    let second_name = ctx.interner.intern("Second");
    let member_type = ctx.interner.intern("type");
    let void_name = ctx.interner.intern("void");

    let t_param = ast.alloc_template_param(TemplateParam {
        name: t_name,
        kind: TemplateParamKind::Type,
        is_variadic: false,
        default: None,
    });
    let t_ref_for_default = ast.alloc_type(TypeNode::TemplateParamRef(t_name));
    let qualified_default = ast.alloc_type(TypeNode::Qualified { base: t_ref_for_default, member: member_type });
    let second_param = ast.alloc_template_param(TemplateParam {
        name: second_name,
        kind: TemplateParamKind::Type,
        is_variadic: false,
        default: Some(TemplateParamDefault::Type(qualified_default)),
    });

    let false_base_ty = ast.alloc_type(TypeNode::Named(ctx.interner.intern("false_type")));
    let primary_struct = ast.alloc_struct(StructDecl {
        name: has_type,
        type_params: vec![t_param, second_param],
        bases: vec![BaseSpec { ty: false_base_ty, access: Access::Public, is_virtual: false }],
        fields: vec![],
        methods: vec![],
        nested_classes: vec![],
        static_asserts: vec![],
        type_aliases: vec![],
        flags: AstStructFlags::default(),
    });
    ctx.templates.register_primary(
        has_type,
        PrimaryTemplate { ast: TemplateAst::Struct(primary_struct), type_params: vec![t_param, second_param] },
    );

    let t_spec_param = ast.alloc_template_param(TemplateParam {
        name: t_name,
        kind: TemplateParamKind::Type,
        is_variadic: false,
        default: None,
    });
    let t_spec_ref = ast.alloc_type(TypeNode::TemplateParamRef(t_name));
    let void_pattern = ast.alloc_type(TypeNode::Named(void_name));
    let true_base_ty = ast.alloc_type(TypeNode::Named(ctx.interner.intern("true_type")));
    let spec_struct = ast.alloc_struct(StructDecl {
        name: has_type,
        type_params: vec![],
        bases: vec![BaseSpec { ty: true_base_ty, access: Access::Public, is_virtual: false }],
        fields: vec![],
        methods: vec![],
        nested_classes: vec![],
        static_asserts: vec![],
        type_aliases: vec![],
        flags: AstStructFlags::default(),
    });
    ctx.templates.register_specialization(
        has_type,
        Specialization {
            ast: TemplateAst::Struct(spec_struct),
            own_params: vec![t_spec_param],
            pattern_args: vec![TemplateArgNode::Type(t_spec_ref), TemplateArgNode::Type(void_pattern)],
        },
    );

    let int_idx = ctx.prelude.i32;
    let result =
        instantiate_class_template(&mut ctx, &mut ast, has_type, vec![TemplateArgument::concrete_type(int_idx)], false)
            .unwrap();

    let info = ctx.types.get(result).unwrap().struct_info.as_ref().unwrap();
    assert_eq!(info.base_classes.len(), 1);
    assert_eq!(info.base_classes[0].type_index, false_type);
    assert_ne!(info.base_classes[0].type_index, true_type);
}

// Scenario 2: `Tuple<int, float, char>` recursively instantiates
// `Tuple<float, char>`, then `Tuple<char>`, then `Tuple<>`, contributing one
// field per layer.
#[test]
fn variadic_tuple_recurses_one_field_per_layer() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let tuple = ctx.interner.intern("Tuple");
    let head_name = ctx.interner.intern("Head");
    let tail_name = ctx.interner.intern("Tail");
    let h_field = ctx.interner.intern("h");

    // Primary: `Tuple<>`, zero params, no bases, no fields.
    let empty_struct = ast.alloc_struct(StructDecl {
        name: tuple,
        type_params: vec![],
        bases: vec![],
        fields: vec![],
        methods: vec![],
        nested_classes: vec![],
        static_asserts: vec![],
        type_aliases: vec![],
        flags: AstStructFlags::default(),
    });
    ctx.templates.register_primary(tuple, PrimaryTemplate { ast: TemplateAst::Struct(empty_struct), type_params: vec![] });

    // Partial specialization: `Tuple<Head, Tail...> : Tuple<Tail...> { Head h; }`.
    let head_param = ast.alloc_template_param(TemplateParam {
        name: head_name,
        kind: TemplateParamKind::Type,
        is_variadic: false,
        default: None,
    });
    let tail_param = ast.alloc_template_param(TemplateParam {
        name: tail_name,
        kind: TemplateParamKind::Type,
        is_variadic: true,
        default: None,
    });
    let head_ref = ast.alloc_type(TypeNode::TemplateParamRef(head_name));
    let tail_ref_pattern = ast.alloc_type(TypeNode::TemplateParamRef(tail_name));

    let head_field_ty = ast.alloc_type(TypeNode::TemplateParamRef(head_name));
    let h_field_id = ast.alloc_field(FieldDecl {
        name: Some(h_field),
        ty: head_field_ty,
        access: Access::Public,
        is_static: false,
        bitfield_width: None,
        default_initializer: None,
    });

    let tail_ref_for_base = ast.alloc_type(TypeNode::TemplateParamRef(tail_name));
    let tail_pack_expansion = ast.alloc_type(TypeNode::PackExpansion(tail_ref_for_base));
    let base_ty = ast.alloc_type(TypeNode::TemplateId { name: tuple, args: vec![TemplateArgNode::Type(tail_pack_expansion)] });

    let spec_struct = ast.alloc_struct(StructDecl {
        name: tuple,
        type_params: vec![],
        bases: vec![BaseSpec { ty: base_ty, access: Access::Public, is_virtual: false }],
        fields: vec![h_field_id],
        methods: vec![],
        nested_classes: vec![],
        static_asserts: vec![],
        type_aliases: vec![],
        flags: AstStructFlags::default(),
    });
    ctx.templates.register_specialization(
        tuple,
        Specialization {
            ast: TemplateAst::Struct(spec_struct),
            own_params: vec![head_param, tail_param],
            pattern_args: vec![TemplateArgNode::Type(head_ref), TemplateArgNode::Type(tail_ref_pattern)],
        },
    );

    let int_idx = ctx.prelude.i32;
    let float_idx = ctx.types.add_type(ctx.interner.intern("float"), TypeKind::Float { bits: 32 }, 32).unwrap();
    let char_idx = ctx.types.add_type(ctx.interner.intern("char"), TypeKind::Char, 8).unwrap();

    let args = vec![
        TemplateArgument::concrete_type(int_idx),
        TemplateArgument::concrete_type(float_idx),
        TemplateArgument::concrete_type(char_idx),
    ];
    let outer = instantiate_class_template(&mut ctx, &mut ast, tuple, args, false).unwrap();

    let outer_info = ctx.types.get(outer).unwrap().struct_info.as_ref().unwrap();
    assert_eq!(outer_info.members.len(), 1);
    assert_eq!(outer_info.members[0].type_index, int_idx);
    assert_eq!(outer_info.base_classes.len(), 1);

    let middle = outer_info.base_classes[0].type_index;
    let middle_info = ctx.types.get(middle).unwrap().struct_info.as_ref().unwrap();
    assert_eq!(middle_info.members[0].type_index, float_idx);
    assert_eq!(middle_info.base_classes.len(), 1);

    let inner = middle_info.base_classes[0].type_index;
    let inner_info = ctx.types.get(inner).unwrap().struct_info.as_ref().unwrap();
    assert_eq!(inner_info.members[0].type_index, char_idx);
    assert_eq!(inner_info.base_classes.len(), 1);

    let base_case = inner_info.base_classes[0].type_index;
    let base_case_info = ctx.types.get(base_case).unwrap().struct_info.as_ref().unwrap();
    assert!(base_case_info.members.is_empty());
    assert!(base_case_info.base_classes.is_empty());

    let outer_entry = ctx.types.get(outer).unwrap();
    assert!(outer_entry.size_in_bits / 8 >= 4 + 4 + 1);
    assert_eq!(outer_entry.size_in_bits / 8 % outer_entry.alignment as u64, 0);

    // Instantiating the same arguments again must hit the cache: same
    // `TypeIndex`, no new registry entries, second call does no layout work.
    let before = ctx.types.len();
    let args_again = vec![
        TemplateArgument::concrete_type(int_idx),
        TemplateArgument::concrete_type(float_idx),
        TemplateArgument::concrete_type(char_idx),
    ];
    let outer_again = instantiate_class_template(&mut ctx, &mut ast, tuple, args_again, false).unwrap();
    assert_eq!(outer_again, outer);
    assert_eq!(ctx.types.len(), before);
}

// Scenario 3: `b.f()` through `B&` where `D` overrides `f` resolves
// statically to `B::f`'s declaration (static overload resolution sees only
// `b`'s declared type), and because that declaration is virtual, lowering
// emits `VirtualCall` off `B`'s vtable slot rather than a direct call — the
// actual override invoked at runtime is out of this crate's scope.
#[test]
fn virtual_method_call_through_reference_emits_virtual_call() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let f_name = ctx.interner.intern("f");
    let b_name = ctx.interner.intern("b");

    let int_ty = ctx.prelude.i32;
    let int_ret = ast.alloc_type(TypeNode::Resolved(int_ty));
    let b_f = ast.alloc_function(FunctionDecl {
        name: f_name,
        parent_struct: None,
        type_params: vec![],
        where_clause: vec![],
        receiver: Some(Receiver { is_mutable: true, is_pointer: false }),
        params: vec![],
        return_type: Some(int_ret),
        body: None,
        access: Access::Public,
        linkage: Linkage::Cpp,
        flags: FunctionFlags { is_virtual: true, ..FunctionFlags::default() },
        vtable_index: Some(0),
    });

    let b_handle = ctx.interner.intern("B");
    let b_idx = ctx.types.add_type(b_handle, TypeKind::Struct, 0).unwrap();
    let mut b_info = StructInfo::new(StructFlags { has_vtable: true, ..StructFlags::default() });
    b_info.member_functions.push(MemberFunction {
        name: f_name,
        declaration: b_f,
        access: Access::Public,
        is_virtual: true,
        is_pure_virtual: false,
        is_override: false,
        is_final: false,
        is_const_method: false,
        is_constructor: false,
        is_destructor: false,
        is_operator_overload: false,
        vtable_index: Some(0),
    });
    ctx.types.set_struct_info(b_idx, b_info).unwrap();

    let int_ret_d = ast.alloc_type(TypeNode::Resolved(int_ty));
    let d_f = ast.alloc_function(FunctionDecl {
        name: f_name,
        parent_struct: None,
        type_params: vec![],
        where_clause: vec![],
        receiver: Some(Receiver { is_mutable: true, is_pointer: false }),
        params: vec![],
        return_type: Some(int_ret_d),
        body: None,
        access: Access::Public,
        linkage: Linkage::Cpp,
        flags: FunctionFlags { is_virtual: true, is_override: true, ..FunctionFlags::default() },
        vtable_index: Some(0),
    });
    let d_handle = ctx.interner.intern("D");
    let d_idx = ctx.types.add_type(d_handle, TypeKind::Struct, 0).unwrap();
    let mut d_info = StructInfo::new(StructFlags { has_vtable: true, ..StructFlags::default() });
    d_info.base_classes.push(BaseClassInfo { type_index: b_idx, access: Access::Public, is_virtual: false });
    d_info.member_functions.push(MemberFunction {
        name: f_name,
        declaration: d_f,
        access: Access::Public,
        is_virtual: true,
        is_pure_virtual: false,
        is_override: true,
        is_final: false,
        is_const_method: false,
        is_constructor: false,
        is_destructor: false,
        is_operator_overload: false,
        vtable_index: Some(0),
    });
    ctx.types.set_struct_info(d_idx, d_info).unwrap();

    let source = FixedCandidates { global: vec![], members: vec![(b_idx, f_name, b_f), (d_idx, f_name, d_f)] };

    // Build the call expression, and the name the call is expected to carry,
    // on the arena/context before `FunctionLowering` takes them by mutable
    // reference.
    let object = ast.alloc_expr(Expr::Ident(b_name));
    let call = ast.alloc_expr(Expr::MethodCall { object, method: f_name, type_args: vec![], args: vec![] });
    let expected_mangled = NameMangler::mangle(&ctx, f_name, &[], false, None, &[], Linkage::Cpp);
    let expected_mangled_handle = ctx.interner.intern(&expected_mangled);

    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    let b_ref_qt = QualifiedType { base: b_idx, pointer_depth: 0, cv: CvQualifier::None, reference: RefQualifier::LValue };
    lowering.bind_local(b_name, b_ref_qt);

    let value = lowering.lower_expression(call, EvalMode::Load).unwrap();

    assert_eq!(value.type_index, int_ty);
    let last = lowering.ir().instructions().last().unwrap();
    assert_eq!(last.opcode, Opcode::VirtualCall);
    assert_eq!(last.payload.name_operand, Some(expected_mangled_handle));
    assert_eq!(last.payload.int_operand, Some(0));
    // `b`'s address, not a copy, is the receiver operand — "through a
    // reference" is exactly this: the object argument stays an lvalue.
    assert_eq!(lowering.categories().category(last.payload.operands[0]), Some(ValueCategory::LValue));
}

// Counterpart to the scenario above: the same virtual `f` invoked on a
// value-typed object (no pointer, no reference) resolves statically — a
// virtual method only dispatches through the vtable when reached
// indirectly.
#[test]
fn virtual_method_call_on_a_value_object_dispatches_statically() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let f_name = ctx.interner.intern("f");
    let v_name = ctx.interner.intern("v");

    let int_ty = ctx.prelude.i32;
    let int_ret = ast.alloc_type(TypeNode::Resolved(int_ty));
    let v_f = ast.alloc_function(FunctionDecl {
        name: f_name,
        parent_struct: None,
        type_params: vec![],
        where_clause: vec![],
        receiver: Some(Receiver { is_mutable: true, is_pointer: false }),
        params: vec![],
        return_type: Some(int_ret),
        body: None,
        access: Access::Public,
        linkage: Linkage::Cpp,
        flags: FunctionFlags { is_virtual: true, ..FunctionFlags::default() },
        vtable_index: Some(0),
    });

    let v_handle = ctx.interner.intern("V");
    let v_idx = ctx.types.add_type(v_handle, TypeKind::Struct, 0).unwrap();
    let mut v_info = StructInfo::new(StructFlags { has_vtable: true, ..StructFlags::default() });
    v_info.member_functions.push(MemberFunction {
        name: f_name,
        declaration: v_f,
        access: Access::Public,
        is_virtual: true,
        is_pure_virtual: false,
        is_override: false,
        is_final: false,
        is_const_method: false,
        is_constructor: false,
        is_destructor: false,
        is_operator_overload: false,
        vtable_index: Some(0),
    });
    ctx.types.set_struct_info(v_idx, v_info).unwrap();

    let source = FixedCandidates { global: vec![], members: vec![(v_idx, f_name, v_f)] };

    let object = ast.alloc_expr(Expr::Ident(v_name));
    let call = ast.alloc_expr(Expr::MethodCall { object, method: f_name, type_args: vec![], args: vec![] });

    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    lowering.bind_local(v_name, QualifiedType::plain(v_idx));

    let value = lowering.lower_expression(call, EvalMode::Load).unwrap();

    assert_eq!(value.type_index, int_ty);
    let last = lowering.ir().instructions().last().unwrap();
    assert_eq!(last.opcode, Opcode::FunctionCall);
    assert!(last.payload.int_operand.is_none());
}

// Scenario 4: `static_cast<S&&>(x)` marks its result an xvalue rooted at
// `x` with no load emitted, and passing it to `sink(S&&)` forwards that
// same temp as the sole call operand rather than loading then
// rematerializing it.
#[test]
fn move_cast_produces_a_no_load_xvalue_forwarded_by_reference() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let s_handle = ctx.interner.intern("S");
    let s_idx = ctx.types.add_type(s_handle, TypeKind::Struct, 0).unwrap();
    ctx.types.set_struct_info(s_idx, StructInfo::new(StructFlags::default())).unwrap();

    let x_name = ctx.interner.intern("x");

    // Part A: the bare cast alone emits nothing and is recorded as an
    // xvalue rooted at `x`.
    {
        let resolved_s = ast.alloc_type(TypeNode::Resolved(s_idx));
        let target = ast.alloc_type(TypeNode::Reference(resolved_s, RefQualifier::RValue));
        let x_expr = ast.alloc_expr(Expr::Ident(x_name));
        let cast = ast.alloc_expr(Expr::Cast { kind: CastKind::Static, target, operand: x_expr });

        let source = FixedCandidates::default();
        let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
        lowering.bind_local(x_name, QualifiedType::plain(s_idx));
        let value = lowering.lower_expression(cast, EvalMode::Load).unwrap();

        assert!(lowering.ir().is_empty());
        assert_eq!(lowering.categories().category(value.var), Some(ValueCategory::XValue));
        let meta = lowering.categories().metadata(value.var).unwrap();
        assert_eq!(meta.lvalue_info.unwrap().base, cpp_core::LValueBase::Name(x_name));
    }

    // Part B: passed to `sink(S&&)`, the call's sole operand is exactly
    // that xvalue temp, produced with the same zero-instruction cast.
    let sink_name = ctx.interner.intern("sink");
    let param_ty = {
        let resolved_s = ast.alloc_type(TypeNode::Resolved(s_idx));
        ast.alloc_type(TypeNode::Reference(resolved_s, RefQualifier::RValue))
    };
    let rhs_name = ctx.interner.intern("rhs");
    let sink_param = ast.alloc_param(ParamDecl { name: rhs_name, ty: param_ty });
    let sink_fn = ast.alloc_function(FunctionDecl {
        name: sink_name,
        parent_struct: None,
        type_params: vec![],
        where_clause: vec![],
        receiver: None,
        params: vec![sink_param],
        return_type: None,
        body: None,
        access: Access::Public,
        linkage: Linkage::Cpp,
        flags: FunctionFlags::default(),
        vtable_index: None,
    });

    let resolved_s2 = ast.alloc_type(TypeNode::Resolved(s_idx));
    let target2 = ast.alloc_type(TypeNode::Reference(resolved_s2, RefQualifier::RValue));
    let x_expr2 = ast.alloc_expr(Expr::Ident(x_name));
    let cast2 = ast.alloc_expr(Expr::Cast { kind: CastKind::Static, target: target2, operand: x_expr2 });
    let callee = ast.alloc_expr(Expr::Ident(sink_name));
    let call = ast.alloc_expr(Expr::Call { callee, type_args: vec![], args: vec![cast2] });

    let source = FixedCandidates { global: vec![sink_fn], members: vec![] };
    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    lowering.bind_local(x_name, QualifiedType::plain(s_idx));
    lowering.lower_expression(call, EvalMode::Load).unwrap();

    assert_eq!(lowering.ir().len(), 1);
    let last = lowering.ir().instructions().last().unwrap();
    assert_eq!(last.opcode, Opcode::FunctionCall);
    assert_eq!(last.payload.operands.len(), 1);
    assert_eq!(lowering.categories().category(last.payload.operands[0]), Some(ValueCategory::XValue));
}

// Scenario 5: `a[i][j][k]` over a declared `int a[3][4][5]` lowers to
// exactly one `ArrayAccess`, with the row-major index `i*20 + j*5 + k`.
#[test]
fn multidimensional_subscript_flattens_to_one_array_access() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let a_name = ctx.interner.intern("a");
    let i_name = ctx.interner.intern("i");
    let j_name = ctx.interner.intern("j");
    let k_name = ctx.interner.intern("k");

    let i_expr = ast.alloc_expr(Expr::Ident(i_name));
    let j_expr = ast.alloc_expr(Expr::Ident(j_name));
    let k_expr = ast.alloc_expr(Expr::Ident(k_name));
    let a_expr = ast.alloc_expr(Expr::Ident(a_name));
    let sub_i = ast.alloc_expr(Expr::Subscript { object: a_expr, index: i_expr });
    let sub_ij = ast.alloc_expr(Expr::Subscript { object: sub_i, index: j_expr });
    let sub_ijk = ast.alloc_expr(Expr::Subscript { object: sub_ij, index: k_expr });

    let int_idx = ctx.prelude.i32;
    let source = FixedCandidates::default();
    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    let i32_ty = QualifiedType::plain(int_idx);
    lowering.bind_local(i_name, i32_ty);
    lowering.bind_local(j_name, i32_ty);
    lowering.bind_local(k_name, i32_ty);
    lowering.bind_array_local(a_name, i32_ty, vec![3, 4, 5]);

    let value = lowering.lower_expression(sub_ijk, EvalMode::Load).unwrap();

    let array_accesses = lowering.ir().instructions().iter().filter(|i| i.opcode == Opcode::ArrayAccess).count();
    assert_eq!(array_accesses, 1);
    let multiply_immediates: Vec<i64> = lowering
        .ir()
        .instructions()
        .iter()
        .filter(|i| i.opcode == Opcode::LoadImmediate)
        .filter_map(|i| i.payload.int_operand)
        .collect();
    assert!(multiply_immediates.contains(&20));
    assert!(multiply_immediates.contains(&5));
    assert_eq!(value.type_index, int_idx);
}

// Scenario 6: `v1 + v2` lowers to a `FunctionCall` to `operator+`, passing
// `v1`'s address as the receiver and `v2`'s address as the by-reference
// argument — both addresses, no copies.
#[test]
fn operator_overload_call_passes_both_operands_by_address() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let v_handle = ctx.interner.intern("V");
    let v_idx = ctx.types.add_type(v_handle, TypeKind::Struct, 0).unwrap();

    let op_name = ctx.interner.intern("operator+");
    let rhs_name = ctx.interner.intern("rhs");
    let resolved_v = ast.alloc_type(TypeNode::Resolved(v_idx));
    let rhs_ty = ast.alloc_type(TypeNode::Reference(resolved_v, RefQualifier::LValue));
    let rhs_param = ast.alloc_param(ParamDecl { name: rhs_name, ty: rhs_ty });
    let return_ty = ast.alloc_type(TypeNode::Resolved(v_idx));
    let op_fn = ast.alloc_function(FunctionDecl {
        name: op_name,
        parent_struct: Some(v_handle),
        type_params: vec![],
        where_clause: vec![],
        receiver: Some(Receiver { is_mutable: false, is_pointer: false }),
        params: vec![rhs_param],
        return_type: Some(return_ty),
        body: None,
        access: Access::Public,
        linkage: Linkage::Cpp,
        flags: FunctionFlags { is_operator_overload: true, is_const_method: true, ..FunctionFlags::default() },
        vtable_index: None,
    });

    let mut v_info = StructInfo::new(StructFlags::default());
    v_info.member_functions.push(MemberFunction {
        name: op_name,
        declaration: op_fn,
        access: Access::Public,
        is_virtual: false,
        is_pure_virtual: false,
        is_override: false,
        is_final: false,
        is_const_method: true,
        is_constructor: false,
        is_destructor: false,
        is_operator_overload: true,
        vtable_index: None,
    });
    ctx.types.set_struct_info(v_idx, v_info).unwrap();

    let v1_name = ctx.interner.intern("v1");
    let v2_name = ctx.interner.intern("v2");
    let v1_expr = ast.alloc_expr(Expr::Ident(v1_name));
    let v2_expr = ast.alloc_expr(Expr::Ident(v2_name));
    let call = ast.alloc_expr(Expr::MethodCall { object: v1_expr, method: op_name, type_args: vec![], args: vec![v2_expr] });

    // The mangled name, computed with the same inputs `lower_method_call`
    // itself derives from `op_fn`'s declaration.
    let rhs_qt = QualifiedType { base: v_idx, pointer_depth: 0, cv: CvQualifier::None, reference: RefQualifier::LValue };
    let expected_mangled = NameMangler::mangle(&ctx, op_name, &[rhs_qt], false, Some(v_handle), &[], Linkage::Cpp);
    let expected_mangled_handle = ctx.interner.intern(&expected_mangled);

    let source = FixedCandidates { global: vec![], members: vec![(v_idx, op_name, op_fn)] };
    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    lowering.bind_local(v1_name, QualifiedType::plain(v_idx));
    lowering.bind_local(v2_name, QualifiedType::plain(v_idx));

    let value = lowering.lower_expression(call, EvalMode::Load).unwrap();

    assert_eq!(value.type_index, v_idx);
    let last = lowering.ir().instructions().last().unwrap();
    assert_eq!(last.opcode, Opcode::FunctionCall);
    assert_eq!(last.payload.name_operand, Some(expected_mangled_handle));
    assert_eq!(last.payload.operands.len(), 2);
    for &operand in &last.payload.operands {
        assert_eq!(lowering.categories().category(operand), Some(ValueCategory::LValue));
    }

    let first = NameMangler::mangle(&ctx, op_name, &[rhs_qt], false, Some(v_handle), &[], Linkage::Cpp);
    let second = NameMangler::mangle(&ctx, op_name, &[rhs_qt], false, Some(v_handle), &[], Linkage::Cpp);
    assert_eq!(first, second);
}

// Quantified property: substitution never mutates the arena it walks —
// every substituted node is a fresh allocation.
#[test]
fn substitution_does_not_mutate_the_source_ast() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();

    let t_name = ctx.interner.intern("T");
    let original = ast.alloc_type(TypeNode::TemplateParamRef(t_name));

    let mut subst = SubstitutionMap::new();
    subst.bind_scalar(t_name, TemplateArgument::concrete_type(ctx.prelude.i32));
    let substituted = ExpressionSubstitutor::new(&ctx.types, &ctx.templates)
        .substitute_type(&mut ast, original, &subst)
        .unwrap();

    assert!(matches!(ast.ty(original), TypeNode::TemplateParamRef(name) if *name == t_name));
    assert!(matches!(ast.ty(substituted), TypeNode::Resolved(idx) if *idx == ctx.prelude.i32));
    assert_ne!(original, substituted);
}

// Quantified property: an lvalue-address lowering never emits a load.
#[test]
fn lvalue_address_lowering_emits_no_load() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();
    let x_name = ctx.interner.intern("x");
    let expr = ast.alloc_expr(Expr::Ident(x_name));

    let int_idx = ctx.prelude.i32;
    let source = FixedCandidates::default();
    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    lowering.bind_local(x_name, QualifiedType::plain(int_idx));
    let value = lowering.lower_expression(expr, EvalMode::LValueAddress).unwrap();

    assert!(lowering.ir().is_empty());
    assert_eq!(lowering.categories().category(value.var), Some(ValueCategory::LValue));
}

// Quantified property: `sizeof` is evaluated at compile time — its operand
// contributes no IR of its own, only the final size literal is emitted.
#[test]
fn sizeof_of_a_variable_emits_only_the_size_literal() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();
    let a_name = ctx.interner.intern("a");
    let operand = ast.alloc_expr(Expr::Ident(a_name));
    let sizeof_expr = ast.alloc_expr(Expr::Sizeof(cpp_ast::SizeofArg::Expr(operand)));

    let int_idx = ctx.prelude.i32;
    let source = FixedCandidates::default();
    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    lowering.bind_local(a_name, QualifiedType::plain(int_idx));
    lowering.lower_expression(sizeof_expr, EvalMode::Load).unwrap();

    assert_eq!(lowering.ir().len(), 1);
    assert_eq!(lowering.ir().instructions()[0].opcode, Opcode::LoadImmediate);
}

// Quantified property: `static_cast<bool>(x)` always lowers through an
// equality-with-zero comparison, whose result is a boolean 0/1 by
// construction.
#[test]
fn static_cast_to_bool_lowers_through_not_equal_zero() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();
    let literal = ast.alloc_expr(Expr::IntLiteral(5));
    let bool_ty = ast.alloc_type(TypeNode::Resolved(ctx.prelude.bool_));
    let cast = ast.alloc_expr(Expr::Cast { kind: CastKind::Static, target: bool_ty, operand: literal });

    let source = FixedCandidates::default();
    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    let value = lowering.lower_expression(cast, EvalMode::Load).unwrap();

    assert_eq!(value.type_index, ctx.prelude.bool_);
    assert_eq!(lowering.ir().instructions().last().unwrap().opcode, Opcode::NotEqual);
}

// Quantified property: `const_cast<T>(const_cast<const T>(x))` reproduces
// `x`'s original type.
#[test]
fn double_const_cast_round_trips_the_type() {
    let mut ctx = CompilationContext::default();
    let mut ast = AstArena::new();
    let t_idx = ctx.prelude.i32;
    let x_name = ctx.interner.intern("x");
    let x_expr = ast.alloc_expr(Expr::Ident(x_name));

    let resolved_t1 = ast.alloc_type(TypeNode::Resolved(t_idx));
    let inner_cast = ast.alloc_expr(Expr::Cast { kind: CastKind::Const, target: resolved_t1, operand: x_expr });
    let resolved_t2 = ast.alloc_type(TypeNode::Resolved(t_idx));
    let outer_cast = ast.alloc_expr(Expr::Cast { kind: CastKind::Const, target: resolved_t2, operand: inner_cast });

    let source = FixedCandidates::default();
    let mut lowering = FunctionLowering::new(&mut ctx, &mut ast, &source, None);
    lowering.bind_local(x_name, QualifiedType::plain(t_idx));
    let value = lowering.lower_expression(outer_cast, EvalMode::Load).unwrap();

    assert_eq!(value.type_index, t_idx);
    assert_eq!(value.pointer_depth, 0);
}
