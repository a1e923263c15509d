//! An in-memory provider client for exercising the Dispatcher and Operation
//! Coordinator without a real cloud SDK. Supports one-shot error injection
//! the way the pack's mock storage providers do.

use std::sync::Mutex;

use async_trait::async_trait;
use controller_core::{ControllerError, OperationKind, QuotaDetails, RegionQuota, Result};
use tokio::time::{sleep, Duration};

use crate::client::{MutationHandle, ProviderClient};

#[derive(Default)]
pub struct MockProviderClient {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    fail_next_mutation: Option<ControllerError>,
    fail_next_read: Option<ControllerError>,
    mutation_delay: Duration,
    commits_before_terminal: bool,
}

impl MockProviderClient {
    /// The next `execute_mutation` call returns this error instead of succeeding.
    pub fn fail_next_mutation_with(&self, error: ControllerError) {
        self.inner.lock().unwrap().fail_next_mutation = Some(error);
    }

    pub fn fail_next_read_with(&self, error: ControllerError) {
        self.inner.lock().unwrap().fail_next_read = Some(error);
    }

    /// Delay before the mutation's terminal result, to give tests a window
    /// in which to race a cancellation against commit.
    pub fn set_mutation_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().mutation_delay = delay;
    }

    /// Whether the mock marks itself committed partway through the delay
    /// (simulating a provider that accepts the change irrevocably before
    /// the terminal response arrives).
    pub fn set_commits_before_terminal(&self, commits: bool) {
        self.inner.lock().unwrap().commits_before_terminal = commits;
    }

    pub fn quota_exceeded_error() -> ControllerError {
        ControllerError::Quota {
            details: QuotaDetails {
                instance_type: "p4d.24xlarge".into(),
                region: "ap-northeast-2".into(),
                current_quota: 0,
                current_usage: 0,
                available_quota: 0,
                required_count: 1,
                quota_increase_url: "https://console.example.com/quota".into(),
                available_regions: vec![RegionQuota { region: "us-east-1".into(), available_quota: 2 }],
            },
        }
    }

    pub fn dependency_error(resource_id: &str) -> ControllerError {
        ControllerError::dependency(
            resource_id,
            &format!("VPC '{resource_id}' cannot be deleted while subnets are attached. Please delete or detach dependent subnets first."),
        )
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn execute_read(&self, _op_kind: &OperationKind, payload: serde_json::Value) -> Result<serde_json::Value> {
        if let Some(err) = self.inner.lock().unwrap().fail_next_read.take() {
            return Err(err);
        }
        Ok(payload)
    }

    async fn execute_mutation(&self, op_kind: &OperationKind, payload: serde_json::Value, handle: MutationHandle<'_>) -> Result<serde_json::Value> {
        if let Some(err) = self.inner.lock().unwrap().fail_next_mutation.take() {
            return Err(err);
        }

        let (delay, commits_before_terminal) = {
            let state = self.inner.lock().unwrap();
            (state.mutation_delay, state.commits_before_terminal)
        };

        if delay.is_zero() {
            handle.mark_committed();
        } else {
            let half = delay / 2;
            tokio::select! {
                _ = handle.cancel.cancelled() => {
                    return Err(ControllerError::internal("mutation cancelled before commit"));
                }
                () = sleep(half) => {}
            }
            if commits_before_terminal {
                handle.mark_committed();
            }
            tokio::select! {
                _ = handle.cancel.cancelled(), if !handle.committed.load(std::sync::atomic::Ordering::SeqCst) => {
                    return Err(ControllerError::internal("mutation cancelled before commit"));
                }
                () = sleep(delay - half) => {}
            }
            handle.mark_committed();
        }

        (handle.report_progress)(100);
        Ok(serde_json::json!({ "kind": op_kind.as_str(), "status": "ACTIVE", "echo": payload }))
    }

    async fn abort_in_progress(&self, _op_kind: &OperationKind, _payload: serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn list_regions(&self) -> Result<Vec<String>> {
        Ok(vec!["ap-northeast-2".to_string(), "us-east-1".to_string()])
    }
}
