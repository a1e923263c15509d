//! # controller-crypto
//!
//! The Crypto Envelope (C1): authenticated encryption of credential
//! plaintext under a versioned master key. This crate has no notion of
//! workspaces, credentials, or storage — it only seals and opens byte
//! buffers. The Credential Store builds on top of it.

mod envelope;
mod key_provider;

pub use envelope::{open, seal, Sealed};
pub use key_provider::{KeyProvider, StaticKeyProvider};
