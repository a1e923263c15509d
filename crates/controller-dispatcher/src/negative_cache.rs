//! Short-TTL memoization of the Dispatcher's own non-retriable failures,
//! grounded in the teacher's `manager::negative_cache` entry shape. This
//! does not change the retry policy (only `ErrUnavailable` is ever
//! retried) — it only short-circuits a *new, distinct* dispatch call that
//! would otherwise repeat a failure a provider just told us about.

use std::time::{Duration, Instant};

use controller_core::{ControllerError, CredentialId, OperationKind};
use dashmap::DashMap;

#[derive(Clone, PartialEq, Eq, Hash)]
struct NegativeCacheKey {
    credential_id: CredentialId,
    op_kind: OperationKind,
}

struct NegativeCacheEntry {
    until: Instant,
    error: ControllerError,
}

pub struct NegativeCache {
    entries: DashMap<NegativeCacheKey, NegativeCacheEntry>,
    ttl: Duration,
}

impl NegativeCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, credential_id: CredentialId, op_kind: &OperationKind) -> Option<ControllerError> {
        let key = NegativeCacheKey { credential_id, op_kind: op_kind.clone() };
        let entry = self.entries.get(&key)?;
        if entry.until > Instant::now() {
            Some(entry.error.clone())
        } else {
            drop(entry);
            self.entries.remove(&key);
            None
        }
    }

    /// Remembers `error` for `(credential_id, op_kind)` for the cache TTL.
    /// Callers should only do this for non-retriable errors — retriable
    /// ones are already handled by the dispatcher's own retry loop.
    pub fn remember(&self, credential_id: CredentialId, op_kind: OperationKind, error: ControllerError) {
        let key = NegativeCacheKey { credential_id, op_kind };
        self.entries.insert(key, NegativeCacheEntry { until: Instant::now() + self.ttl, error });
    }
}
