//! Per-credential in-use counter, incremented by the Dispatcher on entry to
//! any provider call and decremented on exit via a scoped guard — including
//! on panic, since `RefcountGuard`'s drop runs unconditionally.

use std::sync::Arc;

use controller_core::CredentialId;
use dashmap::DashMap;

#[derive(Clone, Default)]
pub struct RefcountTable {
    counts: Arc<DashMap<CredentialId, usize>>,
}

impl RefcountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current in-flight count for a credential. Zero if never acquired or
    /// fully released.
    pub fn count(&self, id: CredentialId) -> usize {
        self.counts.get(&id).map(|c| *c).unwrap_or(0)
    }

    /// Acquire a reference, returning a guard that releases it on drop.
    pub fn acquire(&self, id: CredentialId) -> RefcountGuard {
        *self.counts.entry(id).or_insert(0) += 1;
        RefcountGuard { table: self.clone(), id }
    }
}

/// Releases its credential's refcount on drop, regardless of how the scope
/// was exited (return, early `?`, or panic unwind).
pub struct RefcountGuard {
    table: RefcountTable,
    id: CredentialId,
}

impl Drop for RefcountGuard {
    fn drop(&mut self) {
        if let Some(mut count) = self.table.counts.get_mut(&self.id) {
            *count = count.saturating_sub(1);
        }
    }
}
