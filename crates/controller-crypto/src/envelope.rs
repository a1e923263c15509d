//! Envelope layout: `magic(4) || version(u32 BE) || nonce(12) || ciphertext || tag(16)`.
//!
//! AES-256-GCM's `encrypt` call appends the 16-byte tag to its returned
//! buffer, so the on-wire ciphertext segment already matches this layout
//! without extra bookkeeping.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use controller_core::{defaults, ControllerError, KeyVersion};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::key_provider::KeyProvider;

/// Plaintext sealed under the current master key, ready to be stored as
/// opaque ciphertext.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub key_version: KeyVersion,
}

/// Seals `plaintext` under the key provider's current version. Never fails
/// except on RNG exhaustion, surfaced as `ControllerError::Crypto`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn seal(plaintext: &[u8], keys: &dyn KeyProvider) -> Result<Sealed, ControllerError> {
    let version = keys.current_version();
    let key_bytes = keys.key(version).ok_or(ControllerError::Crypto)?;

    let mut nonce_bytes = [0u8; defaults::NONCE_LEN];
    rand::thread_rng().try_fill_bytes(&mut nonce_bytes).map_err(|_| ControllerError::Crypto)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext_and_tag = cipher.encrypt(nonce, plaintext).map_err(|_| ControllerError::Crypto)?;

    let mut framed = Vec::with_capacity(4 + 4 + nonce_bytes.len() + ciphertext_and_tag.len());
    framed.extend_from_slice(&defaults::ENVELOPE_MAGIC);
    framed.extend_from_slice(&version.0.to_be_bytes());
    framed.extend_from_slice(&nonce_bytes);
    framed.extend_from_slice(&ciphertext_and_tag);

    Ok(Sealed { ciphertext: framed, key_version: version })
}

/// Opens an envelope produced by [`seal`]. Every failure mode — malformed
/// header, unknown key version, tampered nonce/tag/body — collapses to the
/// single opaque `ControllerError::Crypto`, per the "fails closed" contract;
/// the caller must not be able to distinguish *why* decryption failed.
#[tracing::instrument(level = "debug", skip_all)]
pub fn open(envelope: &[u8], keys: &dyn KeyProvider) -> Result<(Zeroizing<Vec<u8>>, KeyVersion), ControllerError> {
    let header_len = defaults::ENVELOPE_MAGIC.len() + 4 + defaults::NONCE_LEN;
    if envelope.len() < header_len {
        return Err(ControllerError::Crypto);
    }

    let (magic, rest) = envelope.split_at(defaults::ENVELOPE_MAGIC.len());
    if magic != defaults::ENVELOPE_MAGIC {
        return Err(ControllerError::Crypto);
    }

    let (version_bytes, rest) = rest.split_at(4);
    let version = KeyVersion(u32::from_be_bytes(version_bytes.try_into().map_err(|_| ControllerError::Crypto)?));

    let (nonce_bytes, ciphertext_and_tag) = rest.split_at(defaults::NONCE_LEN);
    if ciphertext_and_tag.len() < defaults::TAG_LEN {
        return Err(ControllerError::Crypto);
    }

    let key_bytes = keys.key(version).ok_or(ControllerError::Crypto)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher.decrypt(nonce, ciphertext_and_tag).map_err(|_| ControllerError::Crypto)?;
    Ok((Zeroizing::new(plaintext), version))
}
