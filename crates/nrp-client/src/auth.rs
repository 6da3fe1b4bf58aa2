//! Bearer-token authentication, keyed by the host the token is valid for.
//!
//! A single process may hold connections open to several repositories (a
//! production instance and a sandbox, say) each requiring a different
//! token. [`TokenStore`] keeps the mapping and [`Connection`](crate::connection::Connection)
//! consults it once per outgoing request via `nrp_http`'s
//! `with_auth_layer` hook, so a refreshed token takes effect on the very
//! next attempt (including retries of the same logical request).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An opaque bearer token presented as `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct AuthToken(Arc<str>);

impl AuthToken {
    #[must_use]
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthToken").field(&"<redacted>").finish()
    }
}

/// Thread-safe registry of tokens by host.
///
/// Requests to a host with no registered token are sent anonymously
/// (no `Authorization` header) rather than failing — some repository
/// endpoints (e.g. public record reads) do not require auth.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<HashMap<String, AuthToken>>>,
}

impl TokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the token used for requests to `host`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned, which only happens if a
    /// prior holder panicked while holding it.
    pub fn set(&self, host: impl Into<String>, token: AuthToken) {
        self.inner
            .write()
            .expect("token store lock poisoned")
            .insert(host.into(), token);
    }

    /// Look up the token for `host`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned, which only happens if a
    /// prior holder panicked while holding it.
    #[must_use]
    pub fn get(&self, host: &str) -> Option<AuthToken> {
        self.inner
            .read()
            .expect("token store lock poisoned")
            .get(host)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_host_returns_none() {
        let store = TokenStore::new();
        assert!(store.get("repo.example").is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = TokenStore::new();
        store.set("repo.example", AuthToken::new("secret123"));
        let token = store.get("repo.example").expect("token should be present");
        assert_eq!(token.header_value(), "Bearer secret123");
    }

    #[test]
    fn set_replaces_existing_token() {
        let store = TokenStore::new();
        store.set("repo.example", AuthToken::new("old"));
        store.set("repo.example", AuthToken::new("new"));
        let token = store.get("repo.example").expect("token should be present");
        assert_eq!(token.header_value(), "Bearer new");
    }

    #[test]
    fn debug_impl_redacts_token() {
        let token = AuthToken::new("super-secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
    }
}
