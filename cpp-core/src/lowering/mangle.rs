//! `NameMangler` (spec §4.6): a pure, total function of (unqualified name,
//! return type descriptor, parameter type descriptors, `is_variadic`,
//! parent struct name, namespace stack, linkage) producing a byte-stable
//! mangled name. C linkage passes the unqualified name through verbatim;
//! C++ linkage uses a compact Itanium-flavored encoding — the exact byte
//! sequence is an implementation choice, but two calls with equal inputs
//! always produce equal output (spec §3 invariant).

use crate::context::CompilationContext;
use crate::types::{QualifiedType, TypeKind};
use cpp_ast::{CvQualifier, Linkage, RefQualifier, StringHandle};

/// One parameter's type shape, already resolved (no template parameters
/// left unsubstituted) — the mangler never walks the AST itself.
pub type ParamDescriptor = QualifiedType;

pub struct NameMangler;

impl NameMangler {
    /// Produces the mangled name for a function. `namespace_stack` is
    /// outermost-first; `parent_struct` is `None` for a free function.
    pub fn mangle(
        ctx: &CompilationContext,
        unqualified_name: StringHandle,
        params: &[ParamDescriptor],
        is_variadic: bool,
        parent_struct: Option<StringHandle>,
        namespace_stack: &[StringHandle],
        linkage: Linkage,
    ) -> String {
        let name_str = resolve(ctx, unqualified_name);
        if linkage == Linkage::C {
            return name_str;
        }

        let mut qualified_segments: Vec<String> = namespace_stack.iter().map(|h| resolve(ctx, *h)).collect();
        if let Some(parent) = parent_struct {
            qualified_segments.push(resolve(ctx, parent));
        }
        qualified_segments.push(name_str);

        let mut out = String::from("_Z");
        if qualified_segments.len() > 1 {
            out.push('N');
            for seg in &qualified_segments {
                out.push_str(&seg.len().to_string());
                out.push_str(seg);
            }
            out.push('E');
        } else {
            let seg = &qualified_segments[0];
            out.push_str(&seg.len().to_string());
            out.push_str(seg);
        }

        if params.is_empty() {
            out.push('v');
        } else {
            for param in params {
                out.push_str(&type_descriptor(ctx, *param));
            }
        }
        if is_variadic {
            out.push('z');
        }
        out
    }
}

fn resolve(ctx: &CompilationContext, name: StringHandle) -> String {
    ctx.interner.resolve(name).unwrap_or_else(|| format!("T{}", name.0))
}

/// A single-letter-rooted type code, mirroring the Itanium scheme closely
/// enough to stay recognizable without committing to full conformance
/// (out of scope per spec §1's non-goal "full language conformance").
fn type_descriptor(ctx: &CompilationContext, qt: QualifiedType) -> String {
    let mut out = String::new();
    match qt.reference {
        RefQualifier::LValue => out.push('R'),
        RefQualifier::RValue => out.push('O'),
        RefQualifier::None => {}
    }
    for _ in 0..qt.pointer_depth {
        out.push('P');
    }
    match qt.cv {
        CvQualifier::Const | CvQualifier::ConstVolatile => out.push('K'),
        _ => {}
    }
    out.push_str(&base_descriptor(ctx, qt));
    out
}

fn base_descriptor(ctx: &CompilationContext, qt: QualifiedType) -> String {
    let Some(info) = ctx.types.get(qt.base) else {
        return format!("U{}", qt.base.0);
    };
    match info.kind {
        TypeKind::Void => "v".to_string(),
        TypeKind::Bool => "b".to_string(),
        TypeKind::Char => "c".to_string(),
        TypeKind::Nullptr => "Dn".to_string(),
        TypeKind::Auto => "Da".to_string(),
        TypeKind::Dependent => format!("Dep{}", qt.base.0),
        TypeKind::Int { bits, signed } => match (bits, signed) {
            (8, true) => "a".to_string(),
            (8, false) => "h".to_string(),
            (16, true) => "s".to_string(),
            (16, false) => "t".to_string(),
            (32, true) => "i".to_string(),
            (32, false) => "j".to_string(),
            (64, true) => "x".to_string(),
            (64, false) => "y".to_string(),
            (other_bits, signed) => format!("{}I{}", if signed { "i" } else { "u" }, other_bits),
        },
        TypeKind::Float { bits: 32 } => "f".to_string(),
        TypeKind::Float { bits: 64 } => "d".to_string(),
        TypeKind::Float { bits } => format!("fF{}", bits),
        TypeKind::Enum | TypeKind::Struct | TypeKind::Union | TypeKind::UserDefined | TypeKind::Function => {
            let name = resolve(ctx, info.name);
            format!("{}{}", name.len(), name)
        }
    }
}
