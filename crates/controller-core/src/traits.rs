//! Base traits shared by the controller's owned entity types.

use crate::id::WorkspaceId;

/// Implemented by every entity that belongs to exactly one workspace
/// (Credential, Operation, Event). Used by the Dispatcher's scoping check
/// and by the SSE Gateway's authorization filter so both can reason about
/// workspace membership without depending on the concrete entity type.
pub trait WorkspaceScoped {
    fn workspace_id(&self) -> WorkspaceId;
}

/// Implemented by entities that carry a globally unique id of their own kind.
pub trait Identifiable {
    type Id: std::fmt::Display + Clone + Eq;

    fn id(&self) -> Self::Id;
}
