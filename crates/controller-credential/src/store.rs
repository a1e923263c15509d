//! The Credential Store (C2): create, update, delete, list, and the scoped
//! decryption boundary that is the only way plaintext ever becomes visible.

use std::sync::Arc;

use chrono::Utc;
use controller_core::{Config, ControllerError, CredentialId, ProviderType, Result, WorkspaceId};
use dashmap::DashMap;

use crate::model::{Credential, PlaintextPayload};
use crate::refcount::RefcountTable;
use crate::schema::ProviderSchemaLookup;

/// In-process, in-memory credential store. Persistence beyond process
/// lifetime is out of scope for this kernel (see `spec.md` §1's excluded
/// collaborators: DB schema migrations are an external concern).
pub struct CredentialStore {
    config: Arc<Config>,
    keys: Arc<dyn controller_crypto::KeyProvider>,
    schema: Arc<dyn ProviderSchemaLookup>,
    rows: DashMap<CredentialId, Credential>,
    /// `(workspace, name) -> id`, enforcing the uniqueness invariant in §3.
    by_name: DashMap<(WorkspaceId, String), CredentialId>,
    refcounts: RefcountTable,
}

impl CredentialStore {
    pub fn new(config: Arc<Config>, keys: Arc<dyn controller_crypto::KeyProvider>, schema: Arc<dyn ProviderSchemaLookup>) -> Self {
        Self {
            config,
            keys,
            schema,
            rows: DashMap::new(),
            by_name: DashMap::new(),
            refcounts: RefcountTable::new(),
        }
    }

    pub fn refcounts(&self) -> &RefcountTable {
        &self.refcounts
    }

    #[tracing::instrument(level = "debug", skip(self, payload), fields(workspace = %workspace, provider = %provider_type, name = %name))]
    pub fn create(
        &self,
        workspace: WorkspaceId,
        provider_type: ProviderType,
        name: String,
        payload: PlaintextPayload,
    ) -> Result<Credential> {
        if !self.schema.is_known(&provider_type) {
            return Err(ControllerError::Validation { message: format!("unknown provider type '{provider_type}'") });
        }
        let required = self.schema.required_fields(&provider_type).unwrap_or_default();
        for field in &required {
            if payload.get(field).is_none() {
                return Err(ControllerError::Validation { message: format!("missing required field '{field}' for provider '{provider_type}'") });
            }
        }

        let dedup_key = (workspace, name.clone());
        if self.by_name.contains_key(&dedup_key) {
            return Err(ControllerError::Conflict { message: format!("credential named '{name}' already exists in workspace {workspace}") });
        }

        let sealed = controller_crypto::seal(&payload.to_wire_bytes(), self.keys.as_ref())?;
        let now = Utc::now();
        let credential = Credential {
            id: CredentialId::new(),
            workspace_id: workspace,
            provider_type,
            name,
            ciphertext: sealed.ciphertext,
            key_version: sealed.key_version,
            created_at: now,
            updated_at: now,
        };

        self.rows.insert(credential.id, credential.clone());
        self.by_name.insert(dedup_key, credential.id);
        Ok(credential)
    }

    /// Re-envelopes under the current key version. Fails fast with
    /// `ErrInUse` if any operation currently holds a reference — it does not
    /// wait for the refcount to drain.
    #[tracing::instrument(level = "debug", skip(self, payload))]
    pub fn update(&self, id: CredentialId, payload: PlaintextPayload) -> Result<()> {
        if self.refcounts.count(id) > 0 {
            return Err(ControllerError::InUse { resource_type: "credential".into(), resource_id: id.to_string(), holder: "in-flight dispatch".into() });
        }
        let mut row = self.rows.get_mut(&id).ok_or_else(|| ControllerError::not_found("credential", id.to_string()))?;
        let sealed = controller_crypto::seal(&payload.to_wire_bytes(), self.keys.as_ref())?;
        row.ciphertext = sealed.ciphertext;
        row.key_version = sealed.key_version;
        row.updated_at = Utc::now();
        Ok(())
    }

    /// Permanently removes a credential. Fails fast with `ErrInUse` if any
    /// non-terminal Operation holds a reference.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn delete(&self, id: CredentialId) -> Result<()> {
        if self.refcounts.count(id) > 0 {
            return Err(ControllerError::InUse { resource_type: "credential".into(), resource_id: id.to_string(), holder: "in-flight dispatch".into() });
        }
        let (_, row) = self.rows.remove(&id).ok_or_else(|| ControllerError::not_found("credential", id.to_string()))?;
        self.by_name.remove(&(row.workspace_id, row.name));
        Ok(())
    }

    pub fn list(&self, workspace: WorkspaceId, provider_type: Option<&ProviderType>) -> Vec<Credential> {
        self.rows
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|c| c.workspace_id == workspace)
            .filter(|c| provider_type.is_none_or(|want| &c.provider_type == want))
            .collect()
    }

    pub fn get(&self, id: CredentialId) -> Result<Credential> {
        self.rows.get(&id).map(|e| e.value().clone()).ok_or_else(|| ControllerError::not_found("credential", id.to_string()))
    }

    /// The only way to obtain plaintext. Opens the envelope, invokes `f`
    /// exactly once with a borrow of the plaintext, then the payload's
    /// `Drop` impl zeroizes it — unconditionally, so a panicking `f` still
    /// leaves no residue (the unwind runs through the `PlaintextPayload`
    /// drop before propagating).
    #[tracing::instrument(level = "debug", skip(self, f))]
    pub fn with_decrypted<R>(&self, id: CredentialId, f: impl FnOnce(&PlaintextPayload) -> R) -> Result<R> {
        let row = self.rows.get(&id).ok_or_else(|| ControllerError::not_found("credential", id.to_string()))?;
        let ciphertext = row.ciphertext.clone();
        drop(row);

        let (plaintext_bytes, _version) = controller_crypto::open(&ciphertext, self.keys.as_ref())?;
        let payload = PlaintextPayload::from_wire_bytes(&plaintext_bytes).map_err(|e| ControllerError::internal(format!("corrupt credential payload: {e}")))?;
        Ok(f(&payload))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PermissiveSchemaLookup;
    use controller_core::KeyVersion;
    use controller_crypto::StaticKeyProvider;
    use std::collections::BTreeMap;

    fn test_config() -> Arc<Config> {
        Arc::new(controller_core::Config::from_toml_str(
            r#"
            [master_key_versions.1]
            key_base64 = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
            current = true
            "#,
        ).unwrap())
    }

    fn test_store() -> CredentialStore {
        let keys = Arc::new(StaticKeyProvider::new(vec![(KeyVersion(1), [3u8; 32], true)]));
        CredentialStore::new(test_config(), keys, Arc::new(PermissiveSchemaLookup))
    }

    fn payload() -> PlaintextPayload {
        let mut fields = BTreeMap::new();
        fields.insert("access_key_id".to_string(), "AKIA-TEST".to_string());
        PlaintextPayload::new(fields)
    }

    #[test]
    fn create_then_decrypt_round_trips() {
        let store = test_store();
        let ws = WorkspaceId::new();
        let cred = store.create(ws, "aws".into(), "prod".to_string(), payload()).unwrap();

        let value = store.with_decrypted(cred.id, |p| p.get("access_key_id").unwrap().to_string()).unwrap();
        assert_eq!(value, "AKIA-TEST");
    }

    #[test]
    fn duplicate_name_in_workspace_conflicts() {
        let store = test_store();
        let ws = WorkspaceId::new();
        store.create(ws, "aws".into(), "prod".to_string(), payload()).unwrap();
        let err = store.create(ws, "aws".into(), "prod".to_string(), payload()).unwrap_err();
        assert_eq!(err.kind(), controller_core::ErrorKind::Conflict);
    }

    #[test]
    fn same_name_in_different_workspaces_is_allowed() {
        let store = test_store();
        store.create(WorkspaceId::new(), "aws".into(), "prod".to_string(), payload()).unwrap();
        let result = store.create(WorkspaceId::new(), "aws".into(), "prod".to_string(), payload());
        assert!(result.is_ok());
    }

    #[test]
    fn delete_fails_while_refcount_is_held() {
        let store = test_store();
        let cred = store.create(WorkspaceId::new(), "aws".into(), "prod".to_string(), payload()).unwrap();
        let _guard = store.refcounts().acquire(cred.id);
        let err = store.delete(cred.id).unwrap_err();
        assert_eq!(err.kind(), controller_core::ErrorKind::InUse);
    }

    #[test]
    fn delete_succeeds_once_refcount_drains() {
        let store = test_store();
        let cred = store.create(WorkspaceId::new(), "aws".into(), "prod".to_string(), payload()).unwrap();
        {
            let _guard = store.refcounts().acquire(cred.id);
        }
        assert!(store.delete(cred.id).is_ok());
        assert!(store.get(cred.id).is_err());
    }

    #[test]
    fn list_filters_by_workspace_and_provider() {
        let store = test_store();
        let ws1 = WorkspaceId::new();
        let ws2 = WorkspaceId::new();
        store.create(ws1, "aws".into(), "a".to_string(), payload()).unwrap();
        store.create(ws1, "gcp".into(), "b".to_string(), payload()).unwrap();
        store.create(ws2, "aws".into(), "c".to_string(), payload()).unwrap();

        assert_eq!(store.list(ws1, None).len(), 2);
        assert_eq!(store.list(ws1, Some(&"aws".into())).len(), 1);
        assert_eq!(store.list(ws2, None).len(), 1);
    }
}
