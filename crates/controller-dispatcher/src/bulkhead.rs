//! Per-credential admission control, grounded in
//! `nebula-resilience::patterns::bulkhead`'s owned-permit semaphore shape,
//! keyed per credential instead of process-wide so one noisy credential
//! cannot starve dispatch capacity for the rest of a workspace.

use std::sync::Arc;
use std::time::Duration;

use controller_core::{ControllerError, CredentialId};
use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct CredentialBulkhead {
    max_concurrency: usize,
    queue_timeout: Duration,
    semaphores: DashMap<CredentialId, Arc<Semaphore>>,
}

impl CredentialBulkhead {
    pub fn new(max_concurrency: usize, queue_timeout: Duration) -> Self {
        Self { max_concurrency, queue_timeout, semaphores: DashMap::new() }
    }

    fn semaphore_for(&self, credential_id: CredentialId) -> Arc<Semaphore> {
        self.semaphores.entry(credential_id).or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrency))).clone()
    }

    /// Waits up to the configured queue timeout for an in-flight slot.
    /// Past that, fails with `ErrUnavailable` per §4.4 — the caller's own
    /// retry policy may retry this, since it is by construction retriable.
    pub async fn acquire(&self, credential_id: CredentialId) -> Result<OwnedSemaphorePermit, ControllerError> {
        let semaphore = self.semaphore_for(credential_id);
        match tokio::time::timeout(self.queue_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(ControllerError::internal("bulkhead semaphore closed")),
            Err(_) => Err(ControllerError::Unavailable {
                message: format!("per-credential in-flight cap ({}) reached; queue timeout exceeded", self.max_concurrency),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_calls_up_to_the_concurrency_cap() {
        let bulkhead = CredentialBulkhead::new(2, Duration::from_millis(50));
        let cred = CredentialId::new();
        let _first = bulkhead.acquire(cred).await.unwrap();
        let _second = bulkhead.acquire(cred).await.unwrap();
        assert!(bulkhead.acquire(cred).await.is_err());
    }

    #[tokio::test]
    async fn releasing_a_permit_admits_the_next_waiter() {
        let bulkhead = CredentialBulkhead::new(1, Duration::from_millis(200));
        let cred = CredentialId::new();
        let first = bulkhead.acquire(cred).await.unwrap();
        drop(first);
        assert!(bulkhead.acquire(cred).await.is_ok());
    }

    #[tokio::test]
    async fn different_credentials_have_independent_caps() {
        let bulkhead = CredentialBulkhead::new(1, Duration::from_millis(50));
        let _first = bulkhead.acquire(CredentialId::new()).await.unwrap();
        assert!(bulkhead.acquire(CredentialId::new()).await.is_ok());
    }
}
