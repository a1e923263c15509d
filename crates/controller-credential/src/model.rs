//! The `Credential` record and the plaintext payload type the store hands
//! out only inside a scoped closure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use controller_core::{CredentialId, KeyVersion, ProviderType, WorkspaceId, WorkspaceScoped};
use zeroize::{Zeroize, Zeroizing};

/// An opaque, encrypted credential row. `ciphertext` is never exposed
/// outside this crate; callers obtain plaintext only through
/// [`crate::store::CredentialStore::with_decrypted`].
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: CredentialId,
    pub workspace_id: WorkspaceId,
    pub provider_type: ProviderType,
    pub name: String,
    pub(crate) ciphertext: Vec<u8>,
    pub key_version: KeyVersion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceScoped for Credential {
    fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }
}

/// Decrypted credential field values, e.g. `access_key_id` / `secret_access_key`
/// for AWS. Zeroized on drop; the store invokes the caller's closure with a
/// `&PlaintextPayload` borrow so the payload cannot outlive the closure.
#[derive(Clone)]
pub struct PlaintextPayload(BTreeMap<String, String>);

impl PlaintextPayload {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub(crate) fn to_wire_bytes(&self) -> Zeroizing<Vec<u8>> {
        // Field order is deterministic (BTreeMap) so the same payload always
        // seals to different ciphertext but the same plaintext bytes. The
        // serialized buffer holds the same secret material as `self` and is
        // scrubbed on drop for the same reason.
        Zeroizing::new(serde_json::to_vec(&self.0).expect("plaintext payload fields are plain strings"))
    }

    pub(crate) fn from_wire_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }
}

impl Zeroize for PlaintextPayload {
    fn zeroize(&mut self) {
        for value in self.0.values_mut() {
            value.zeroize();
        }
        self.0.clear();
    }
}

impl Drop for PlaintextPayload {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for PlaintextPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaintextPayload").field("fields", &self.0.keys().collect::<Vec<_>>()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_round_trips() {
        let mut fields = BTreeMap::new();
        fields.insert("access_key_id".to_string(), "AKIA...".to_string());
        let payload = PlaintextPayload::new(fields);
        let bytes = payload.to_wire_bytes();
        let restored = PlaintextPayload::from_wire_bytes(&bytes).unwrap();
        assert_eq!(restored.get("access_key_id"), Some("AKIA..."));
    }
}
