//! Process-wide interning of identifiers and mangled names into stable
//! [`StringHandle`]s (spec §3, §4's `StringInterner`). Grounded on the host
//! compiler's `TypeInterner` (`dashmap`-backed, intern-or-lookup), adapted
//! from interning `Type` values to interning `str` content.

use cpp_ast::StringHandle;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Interns strings into dense, stable [`StringHandle`]s. Handles are
/// assigned in registration order and never reused (spec §5: "Type indices
/// and string handles are assigned in registration order and never
/// reused").
#[derive(Debug, Default)]
pub struct StringInterner {
    forward: DashMap<String, StringHandle>,
    backward: DashMap<StringHandle, String>,
    next: AtomicU32,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning its stable handle. Interning the same string
    /// twice returns the same handle.
    pub fn intern(&self, s: &str) -> StringHandle {
        if let Some(existing) = self.forward.get(s) {
            return *existing;
        }
        let handle = StringHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.forward.insert(s.to_string(), handle);
        self.backward.insert(handle, s.to_string());
        handle
    }

    pub fn resolve(&self, handle: StringHandle) -> Option<String> {
        self.backward.get(&handle).map(|s| s.clone())
    }

    pub fn lookup(&self, s: &str) -> Option<StringHandle> {
        self.forward.get(s).map(|h| *h)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
