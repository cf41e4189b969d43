//! `CompilationContext` (spec §9 design note): the single explicit value
//! that owns every process-wide registry, replacing global mutable state.

use crate::interner::StringInterner;
use crate::template_registry::{InstantiationKey, TemplateRegistry};
use crate::types::{TypeIndex, TypeKind, TypeRegistry};
use cpp_diagnostics::DiagnosticEngine;
use std::collections::HashSet;

/// Tunables that would otherwise be scattered `#define`s or global flags.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Possible-infinite-instantiation guard (spec §4.9, default 10 000).
    pub max_instantiation_depth: usize,
    /// When true, member functions are substituted eagerly even when the
    /// lazy policy would otherwise defer them (still overridden per-member
    /// for constructors/destructors/virtuals, which are always eager).
    pub eager_member_functions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_instantiation_depth: 10_000,
            eager_member_functions: false,
        }
    }
}

/// The handful of built-in types every translation unit needs pre-registered
/// (spec §4.1 [NEW]: "seeds the seven standard integer widths, `bool`,
/// `void`, `nullptr_t`, and `auto` eagerly", matching the original's
/// `flash_minimal` prelude assumption that these exist without per-TU
/// declaration).
#[derive(Debug, Clone, Copy)]
pub struct Prelude {
    pub void: TypeIndex,
    pub bool_: TypeIndex,
    pub nullptr_t: TypeIndex,
    pub auto_: TypeIndex,
    pub i8: TypeIndex,
    pub u8: TypeIndex,
    pub i16: TypeIndex,
    pub u16: TypeIndex,
    pub i32: TypeIndex,
    pub u32: TypeIndex,
    pub i64: TypeIndex,
}

fn seed_prelude(types: &mut TypeRegistry, interner: &StringInterner) -> Prelude {
    let mut add = |name: &str, kind: TypeKind, bits: u64| {
        let handle = interner.intern(name);
        types.add_type_unchecked(handle, kind, bits)
    };
    Prelude {
        void: add("void", TypeKind::Void, 0),
        bool_: add("bool", TypeKind::Bool, 8),
        nullptr_t: add("nullptr_t", TypeKind::Nullptr, 64),
        auto_: add("auto", TypeKind::Auto, 0),
        i8: add("int8_t", TypeKind::Int { bits: 8, signed: true }, 8),
        u8: add("uint8_t", TypeKind::Int { bits: 8, signed: false }, 8),
        i16: add("int16_t", TypeKind::Int { bits: 16, signed: true }, 16),
        u16: add("uint16_t", TypeKind::Int { bits: 16, signed: false }, 16),
        i32: add("int32_t", TypeKind::Int { bits: 32, signed: true }, 32),
        u32: add("uint32_t", TypeKind::Int { bits: 32, signed: false }, 32),
        i64: add("int64_t", TypeKind::Int { bits: 64, signed: true }, 64),
    }
}

/// Owns the registries shared by instantiation and lowering within one
/// translation unit (spec §5: "single-threaded cooperative... share the
/// process-wide `TypeRegistry`, `StringInterner`, `TemplateRegistry`").
pub struct CompilationContext {
    pub types: TypeRegistry,
    pub interner: StringInterner,
    pub templates: TemplateRegistry,
    pub diagnostics: DiagnosticEngine,
    pub config: EngineConfig,
    pub prelude: Prelude,
    in_progress: HashSet<InstantiationKey>,
    instantiation_depth: usize,
}

impl CompilationContext {
    pub fn new(config: EngineConfig) -> Self {
        let mut types = TypeRegistry::new();
        let interner = StringInterner::new();
        let prelude = seed_prelude(&mut types, &interner);
        Self {
            types,
            interner,
            templates: TemplateRegistry::new(),
            diagnostics: DiagnosticEngine::new(),
            config,
            prelude,
            in_progress: HashSet::new(),
            instantiation_depth: 0,
        }
    }

    pub fn in_progress_set(&mut self) -> &mut HashSet<InstantiationKey> {
        &mut self.in_progress
    }

    /// Call on entry to any instantiation; returns `false` once the
    /// configured recursion bound is exceeded (spec §4.9).
    pub fn enter_instantiation(&mut self) -> bool {
        self.instantiation_depth += 1;
        self.instantiation_depth <= self.config.max_instantiation_depth
    }

    pub fn exit_instantiation(&mut self) {
        self.instantiation_depth = self.instantiation_depth.saturating_sub(1);
    }

    pub fn current_depth(&self) -> usize {
        self.instantiation_depth
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
