//! Maps an `OperationKind` like `create_node_group` to the `<provider>-<resource>-<verb>`
//! event type names the Operation Coordinator publishes, per §6's naming rule.

use controller_core::{EventTypeName, OperationKind, ProviderType};

/// The lifecycle verb a mutation publishes at a given point in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Created,
    Updated,
    Deleted,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Created => "created",
            Verb::Updated => "updated",
            Verb::Deleted => "deleted",
        }
    }
}

/// Strips the `create_`/`delete_`/`update_` prefix from an operation kind and
/// dash-joins the remainder, e.g. `create_node_group` -> `node-group`.
fn resource_name(kind: &OperationKind) -> String {
    let raw = kind.as_str();
    let stripped = raw
        .strip_prefix("create_")
        .or_else(|| raw.strip_prefix("delete_"))
        .or_else(|| raw.strip_prefix("update_"))
        .unwrap_or(raw);
    stripped.replace('_', "-")
}

/// Builds the canonical event type name for one lifecycle event of a
/// dispatched mutation. Construction cannot fail: `provider_type` and
/// `resource_name` are both non-empty by the time a descriptor and an
/// `OperationKind` reach this point, and `verb` is always one of the four
/// canonical verbs.
pub fn event_type(provider_type: &ProviderType, kind: &OperationKind, verb: Verb) -> EventTypeName {
    let name = format!("{}-{}-{}", provider_type.as_str(), resource_name(kind), verb.as_str());
    EventTypeName::parse(name).expect("dispatcher-constructed event type names are always canonical")
}

/// The verb a *successful terminal* event for this kind carries. Creates and
/// updates converge to `updated` with `status: ACTIVE` (spec.md §4.5's
/// progress model); deletes converge to `deleted`.
pub fn terminal_verb(kind: &OperationKind) -> Verb {
    if kind.as_str().starts_with("delete_") {
        Verb::Deleted
    } else {
        Verb::Updated
    }
}

/// The verb a create's *initial* provisioning event carries. Deletes and
/// updates have no distinct "started" event name in the canonical set, so
/// they only publish their terminal event.
pub fn initial_verb(kind: &OperationKind) -> Option<Verb> {
    if kind.as_str().starts_with("create_") {
        Some(Verb::Created)
    } else {
        None
    }
}
