use controller_core::KeyVersion;

/// Vends versioned master keys to the envelope. Decryption under a version
/// the provider does not recognize fails closed with `ErrKeyUnknown`
/// (surfaced as `ControllerError::Crypto` by the caller).
pub trait KeyProvider: Send + Sync {
    /// The version new seals should use.
    fn current_version(&self) -> KeyVersion;

    /// Look up the raw 32-byte key for a version, if loaded.
    fn key(&self, version: KeyVersion) -> Option<&[u8; 32]>;
}

/// A key provider backed by an in-memory table, built once at process start
/// from `Config::master_key_versions` and never mutated afterward.
pub struct StaticKeyProvider {
    current: KeyVersion,
    keys: Vec<(KeyVersion, [u8; 32])>,
}

impl StaticKeyProvider {
    /// Builds the provider from `(version, key, is_current)` triples.
    /// Panics if zero or more than one entry is marked current — this is a
    /// startup-time invariant, not a runtime error.
    pub fn new(entries: Vec<(KeyVersion, [u8; 32], bool)>) -> Self {
        let current_entries: Vec<_> = entries.iter().filter(|(_, _, is_current)| *is_current).collect();
        assert_eq!(current_entries.len(), 1, "exactly one master key must be marked current");
        let current = current_entries[0].0;
        let keys = entries.into_iter().map(|(v, k, _)| (v, k)).collect();
        Self { current, keys }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn current_version(&self) -> KeyVersion {
        self.current
    }

    fn key(&self, version: KeyVersion) -> Option<&[u8; 32]> {
        self.keys.iter().find(|(v, _)| *v == version).map(|(_, k)| k)
    }
}
