//! The SSE handshake authenticates the caller from a session token before a
//! stream is ever opened (§4.7). OIDC token exchange mechanics and the
//! session store itself are external collaborators (spec.md §1's excluded
//! list); this crate only needs the narrow seam into that verification.

use async_trait::async_trait;
use controller_core::CallerId;

/// Verifies a raw session token and resolves it to an authenticated caller.
/// A `None` return is an authentication rejection: the gateway responds 401
/// and never opens a stream.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Option<CallerId>;
}

/// Test/embedding double that accepts any non-empty token, resolving it to a
/// fresh caller identity. Never use outside tests or a throwaway demo.
pub struct AllowAnyToken;

#[async_trait]
impl SessionAuthenticator for AllowAnyToken {
    async fn authenticate(&self, token: &str) -> Option<CallerId> {
        if token.is_empty() {
            None
        } else {
            Some(CallerId::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_token_is_rejected() {
        assert!(AllowAnyToken.authenticate("").await.is_none());
    }

    #[tokio::test]
    async fn non_empty_token_resolves_a_caller() {
        assert!(AllowAnyToken.authenticate("session-abc").await.is_some());
    }
}
