//! Shared value types used across the controller's component boundaries.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A capability a provider descriptor may advertise and a dispatched call may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Vm,
    Kubernetes,
    Network,
    Iam,
    CostEstimate,
    Regions,
}

/// Classifies a dispatched call as a synchronous read or a mutating
/// long-running action, per the Dispatcher's `op_kind` routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchClass {
    /// `list`, `get`, `regions`, `cost-estimate` — executed inline under the deadline.
    SynchronousRead,
    /// `create_*`, `delete_*`, `update_*` — registered with the Operation Coordinator.
    MutatingLongRunning,
}

/// The kind of long-running action an Operation tracks, e.g. `create_cluster`.
/// Modeled as a validated newtype rather than a closed enum: the provider set
/// is open-ended (`aws|gcp|azure|ncp|...`) and new verbs are added by linking
/// in new provider modules, not by widening a match in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKind(String);

impl OperationKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classifies this kind by its verb prefix, per §4.4's dispatch routing rule.
    pub fn dispatch_class(&self) -> DispatchClass {
        if self.0.starts_with("create_") || self.0.starts_with("delete_") || self.0.starts_with("update_") {
            DispatchClass::MutatingLongRunning
        } else {
            DispatchClass::SynchronousRead
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OperationKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The terminal-convergent state machine every Operation moves through.
/// Transitions only flow forward; once terminal, a state never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed | OperationState::Cancelled)
    }

    /// Whether `self -> next` is an allowed transition per the state machine in §4.5.
    pub fn can_transition_to(self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// An event's dotted type name, `<provider>-<resource>-<verb>` where
/// `verb` is one of `created|updated|deleted|list`. Validated at construction
/// so malformed event names cannot be published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventTypeName(String);

const CANONICAL_VERBS: [&str; 4] = ["created", "updated", "deleted", "list"];

impl EventTypeName {
    /// Parses and validates an event type name. Fails if the name does not end
    /// in a canonical verb, or does not have at least `<provider>-<resource>-<verb>`
    /// segments.
    pub fn parse(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        let segments: Vec<&str> = name.split('-').collect();
        if segments.len() < 3 {
            return Err(format!("event type '{name}' must have at least provider-resource-verb segments"));
        }
        let verb = *segments.last().unwrap();
        if !CANONICAL_VERBS.contains(&verb) {
            return Err(format!("event type '{name}' ends in non-canonical verb '{verb}'"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventTypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A wall-clock deadline for a dispatched call, derived from a caller-supplied
/// or config-default duration at call entry.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self { expires_at: Instant::now() + duration }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// The integer version tag selecting a master encryption key, carried in the
/// credential envelope header and in `Config::master_key_versions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyVersion(pub u32);

impl std::fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A CAS version stamp for components that need optimistic concurrency
/// (the C2 refcount table and C5 operation map use plain mutexes instead,
/// but storage backends implementing `StateStore`-style swaps use this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct StateVersion(pub u64);

impl StateVersion {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_classifies_by_verb_prefix() {
        assert_eq!(OperationKind::new("create_cluster").dispatch_class(), DispatchClass::MutatingLongRunning);
        assert_eq!(OperationKind::new("list").dispatch_class(), DispatchClass::SynchronousRead);
        assert_eq!(OperationKind::new("get").dispatch_class(), DispatchClass::SynchronousRead);
    }

    #[test]
    fn state_machine_only_allows_forward_transitions() {
        assert!(OperationState::Pending.can_transition_to(OperationState::Running));
        assert!(OperationState::Running.can_transition_to(OperationState::Succeeded));
        assert!(!OperationState::Succeeded.can_transition_to(OperationState::Running));
        assert!(!OperationState::Pending.can_transition_to(OperationState::Succeeded));
    }

    #[test]
    fn terminal_states_are_recognized() {
        assert!(OperationState::Succeeded.is_terminal());
        assert!(OperationState::Failed.is_terminal());
        assert!(OperationState::Cancelled.is_terminal());
        assert!(!OperationState::Running.is_terminal());
    }

    #[test]
    fn event_type_name_requires_canonical_verb() {
        assert!(EventTypeName::parse("azure-resource-group-created").is_ok());
        assert!(EventTypeName::parse("azure-resource-group-provisioned").is_err());
        assert!(EventTypeName::parse("too-short").is_err());
    }

    #[test]
    fn deadline_reports_expiry() {
        let d = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(d.is_expired());
    }
}
