//! Short-lived viewer tokens. Each token binds one user to one session and
//! a user holds at most one live token.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use rand::RngCore;
use tokio::time::Instant;
use tracing::debug;

use crate::common::{
    errors::AuthError,
    types::{ChannelId, UserId},
};

const TOKEN_BYTES: usize = 32;

/// Length of the base64 text form of a token.
const TOKEN_LEN: usize = 43;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    pub token: String,
    pub user_id: UserId,
    pub session_id: ChannelId,
    pub issued_at: Instant,
    pub ttl: Duration,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        self.issued_at.elapsed() >= self.ttl
    }
}

pub struct TokenStore {
    ttl: Duration,
    by_token: DashMap<String, AuthToken>,
    by_user: DashMap<UserId, String>,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            by_token: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a fresh token for `user_id`, invalidating their previous one.
    pub fn issue(&self, user_id: UserId, session_id: ChannelId) -> String {
        let token = generate_token();
        let record = AuthToken {
            token: token.clone(),
            user_id,
            session_id,
            issued_at: Instant::now(),
            ttl: self.ttl,
        };

        self.by_token.insert(token.clone(), record);
        if let Some(previous) = self.by_user.insert(user_id, token.clone()) {
            self.by_token.remove(&previous);
        }
        debug!("issued viewer token for user {} on session {}", user_id, session_id);
        token
    }

    pub fn validate(&self, token: &str) -> Result<AuthToken, AuthError> {
        if token.len() != TOKEN_LEN || URL_SAFE_NO_PAD.decode(token).is_err() {
            return Err(AuthError::Malformed);
        }

        let record = self
            .by_token
            .get(token)
            .map(|r| r.clone())
            .ok_or(AuthError::UnknownToken)?;

        if record.is_expired() {
            self.remove(&record);
            return Err(AuthError::Expired);
        }
        Ok(record)
    }

    /// Invalidates every token bound to `session_id`.
    pub fn revoke_session(&self, session_id: ChannelId) -> usize {
        self.remove_where(|t| t.session_id == session_id)
    }

    pub fn purge_expired(&self) -> usize {
        self.remove_where(AuthToken::is_expired)
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    fn remove_where(&self, pred: impl Fn(&AuthToken) -> bool) -> usize {
        let doomed: Vec<AuthToken> = self
            .by_token
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect();
        for record in &doomed {
            self.remove(record);
        }
        doomed.len()
    }

    fn remove(&self, record: &AuthToken) {
        self.by_token.remove(&record.token);
        self.by_user.remove_if(&record.user_id, |_, t| *t == record.token);
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_token() {
        let store = TokenStore::new(Duration::from_secs(600));
        let old = store.issue(UserId(1), ChannelId(10));
        let new = store.issue(UserId(1), ChannelId(11));

        assert_eq!(store.validate(&old), Err(AuthError::UnknownToken));
        let record = store.validate(&new).unwrap();
        assert_eq!(record.session_id, ChannelId(11));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_tokens_are_per_user() {
        let store = TokenStore::new(Duration::from_secs(600));
        let a = store.issue(UserId(1), ChannelId(10));
        let b = store.issue(UserId(2), ChannelId(10));
        assert!(store.validate(&a).is_ok());
        assert!(store.validate(&b).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_expire_after_ttl() {
        let store = TokenStore::new(Duration::from_secs(600));
        let token = store.issue(UserId(1), ChannelId(10));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(store.validate(&token).is_ok());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.validate(&token), Err(AuthError::Expired));
        assert!(store.is_empty());
        assert_eq!(store.validate(&token), Err(AuthError::UnknownToken));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_revoke() {
        let store = TokenStore::new(Duration::from_secs(60));
        store.issue(UserId(1), ChannelId(10));
        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = store.issue(UserId(2), ChannelId(10));
        store.issue(UserId(3), ChannelId(20));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.revoke_session(ChannelId(10)), 1);
        assert_eq!(store.validate(&fresh), Err(AuthError::UnknownToken));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_malformed_tokens_rejected_early() {
        let store = TokenStore::new(Duration::from_secs(60));
        assert_eq!(store.validate(""), Err(AuthError::Malformed));
        assert_eq!(store.validate("short"), Err(AuthError::Malformed));
        assert_eq!(store.validate(&"!".repeat(TOKEN_LEN)), Err(AuthError::Malformed));
    }
}
