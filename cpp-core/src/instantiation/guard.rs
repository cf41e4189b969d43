//! RAII guard for the instantiation engine's in-progress set (spec §4.5
//! step 2, §9's "RAII guard objects for every scoped stack push").

use crate::template_registry::InstantiationKey;
use std::collections::HashSet;

/// Marks `key` pending on construction; always clears it again on scope
/// exit, whether that exit is a successful completion (followed by the
/// caller inserting into the completed cache) or an early `?`-propagated
/// error. [`Self::dismiss`] is a no-op marker for call sites documenting
/// "this instantiation finished" — the clearing itself always happens in
/// `Drop`, since a pending marker that outlived a successful instantiation
/// would make every later lookup see a false cycle.
pub struct InProgressGuard<'a> {
    set: &'a mut HashSet<InstantiationKey>,
    key: InstantiationKey,
}

impl<'a> InProgressGuard<'a> {
    /// Returns `None` if `key` is already pending (cycle detected).
    pub fn enter(set: &'a mut HashSet<InstantiationKey>, key: InstantiationKey) -> Option<Self> {
        if set.contains(&key) {
            return None;
        }
        set.insert(key.clone());
        Some(Self { set, key })
    }

    pub fn dismiss(self) {}
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}
