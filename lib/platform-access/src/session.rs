//! Login sessions and their refresh metadata.
//!
//! The authentication cookie carries a [`SessionToken`]; the record behind it
//! names the user and holds a free-form metadata map. The refresh schedule
//! for the provider tokens lives in that map under [`REFRESH_METADATA_KEY`].

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stan_easy_connect_core::{Clock, SessionToken, SystemClock, UserId};
use stan_easy_connect_oidc::TokenSet;

use crate::error::{StoreError, StoreResult};

/// Session metadata entry holding [`RefreshMetadata`].
pub const REFRESH_METADATA_KEY: &str = "stan-easy-connect-refresh";

/// Seconds shaved off the refresh-token lifetime.
const REFRESH_EXPIRY_MARGIN_SECS: i64 = 5;

/// When to refresh the provider tokens, and with what.
///
/// All times are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshMetadata {
    pub next_access_token_refresh_time: i64,
    pub refresh_token: Option<String>,
    /// `None` means the refresh token never expires.
    pub refresh_expires: Option<i64>,
}

impl RefreshMetadata {
    /// Derives the schedule from a token response received at `now`.
    #[must_use]
    pub fn from_tokens(tokens: &TokenSet, now: i64) -> Self {
        let refresh_expires_in = tokens.refresh_expires_in();
        Self {
            next_access_token_refresh_time: now + tokens.expires_in(),
            refresh_token: tokens.refresh_token.clone(),
            refresh_expires: (refresh_expires_in > 0)
                .then(|| now + refresh_expires_in - REFRESH_EXPIRY_MARGIN_SECS),
        }
    }

    /// Whether the access token is due for a refresh.
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        now >= self.next_access_token_refresh_time
    }

    /// The refresh token, if there is one and it has not expired.
    #[must_use]
    pub fn usable_refresh_token(&self, now: i64) -> Option<&str> {
        let token = self.refresh_token.as_deref().filter(|t| !t.is_empty())?;
        self.refresh_expires
            .is_none_or(|expires| now <= expires)
            .then_some(token)
    }

    fn to_value(&self) -> Value {
        json!({
            "next_access_token_refresh_time": self.next_access_token_refresh_time,
            "refresh_token": self.refresh_token,
            "refresh_expires": self.refresh_expires,
        })
    }
}

/// A stored login session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    token: SessionToken,
    user_id: UserId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    metadata: BTreeMap<String, Value>,
}

impl SessionRecord {
    #[must_use]
    pub fn token(&self) -> SessionToken {
        self.token
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Refresh schedule, if this session was created through Stan.
    #[must_use]
    pub fn refresh_metadata(&self) -> Option<RefreshMetadata> {
        let value = self.metadata.get(REFRESH_METADATA_KEY)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn set_refresh_metadata(&mut self, refresh: &RefreshMetadata) {
        self.metadata
            .insert(REFRESH_METADATA_KEY.to_string(), refresh.to_value());
    }
}

/// The site's session-token directory.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session for `user_id` valid until `expires_at`.
    async fn create(
        &self,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<SessionToken>;

    /// Returns the session unless it is unknown or expired.
    async fn get(&self, token: SessionToken) -> StoreResult<Option<SessionRecord>>;

    /// Replaces the stored metadata of an existing session.
    async fn update(&self, record: &SessionRecord) -> StoreResult<()>;

    async fn destroy(&self, token: SessionToken) -> StoreResult<()>;
}

/// [`SessionStore`] kept in process memory.
pub struct InMemorySessionStore {
    sessions: RwLock<BTreeMap<SessionToken, SessionRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Number of live sessions held for `user_id`.
    pub fn count_for(&self, user_id: UserId) -> usize {
        let now = self.clock.now();
        self.sessions
            .read()
            .map(|sessions| {
                sessions
                    .values()
                    .filter(|s| s.user_id == user_id && !s.is_expired(now))
                    .count()
            })
            .unwrap_or_default()
    }

    fn unavailable(e: impl std::fmt::Display) -> StoreError {
        StoreError::Unavailable {
            details: e.to_string(),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(
        &self,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<SessionToken> {
        let now = self.clock.now();
        let record = SessionRecord {
            token: SessionToken::new(),
            user_id,
            created_at: now,
            expires_at,
            metadata: BTreeMap::new(),
        };
        let token = record.token;

        let mut sessions = self.sessions.write().map_err(Self::unavailable)?;
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(token, record);
        Ok(token)
    }

    async fn get(&self, token: SessionToken) -> StoreResult<Option<SessionRecord>> {
        let now = self.clock.now();
        let sessions = self.sessions.read().map_err(Self::unavailable)?;
        Ok(sessions
            .get(&token)
            .filter(|s| !s.is_expired(now))
            .cloned())
    }

    async fn update(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut sessions = self.sessions.write().map_err(Self::unavailable)?;
        let stored = sessions
            .get_mut(&record.token)
            .ok_or(StoreError::SessionNotFound {
                token: record.token,
            })?;
        stored.metadata.clone_from(&record.metadata);
        Ok(())
    }

    async fn destroy(&self, token: SessionToken) -> StoreResult<()> {
        self.sessions
            .write()
            .map_err(Self::unavailable)?
            .remove(&token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stan_easy_connect_core::ManualClock;

    const NOW: i64 = 1_700_000_000;

    fn tokens(expires_in: i64, refresh_token: Option<&str>, refresh_expires_in: Option<i64>) -> TokenSet {
        TokenSet {
            access_token: Some("at".to_string()),
            id_token: Some("h.p.s".to_string()),
            refresh_token: refresh_token.map(str::to_string),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(expires_in),
            refresh_expires_in,
        }
    }

    #[test]
    fn refresh_expiry_keeps_a_margin() {
        let meta = RefreshMetadata::from_tokens(&tokens(300, Some("rt"), Some(3600)), NOW);

        assert_eq!(meta.next_access_token_refresh_time, NOW + 300);
        assert_eq!(meta.refresh_expires, Some(NOW + 3600 - 5));
        assert_eq!(meta.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn non_positive_refresh_lifetime_never_expires() {
        let meta = RefreshMetadata::from_tokens(&tokens(300, Some("rt"), Some(0)), NOW);
        assert_eq!(meta.refresh_expires, None);

        let meta = RefreshMetadata::from_tokens(&tokens(300, Some("rt"), None), NOW);
        assert_eq!(meta.refresh_expires, None);
    }

    #[test]
    fn due_and_usable_follow_the_clock() {
        let meta = RefreshMetadata::from_tokens(&tokens(300, Some("rt"), Some(600)), NOW);

        assert!(!meta.is_due(NOW + 299));
        assert!(meta.is_due(NOW + 300));
        assert_eq!(meta.usable_refresh_token(NOW + 595), Some("rt"));
        assert_eq!(meta.usable_refresh_token(NOW + 596), None);
    }

    #[test]
    fn empty_refresh_token_is_unusable() {
        let meta = RefreshMetadata::from_tokens(&tokens(300, Some(""), None), NOW);
        assert_eq!(meta.usable_refresh_token(NOW), None);
    }

    #[tokio::test]
    async fn refresh_metadata_persists_through_update() {
        let store = InMemorySessionStore::with_clock(Arc::new(ManualClock::at_timestamp(NOW)));
        let user = UserId::new();
        let expires = DateTime::from_timestamp(NOW, 0).unwrap() + Duration::days(2);
        let token = store.create(user, expires).await.unwrap();

        let mut record = store.get(token).await.unwrap().unwrap();
        assert_eq!(record.refresh_metadata(), None);

        let meta = RefreshMetadata::from_tokens(&tokens(300, Some("rt"), Some(3600)), NOW);
        record.set_refresh_metadata(&meta);
        store.update(&record).await.unwrap();

        let reloaded = store.get(token).await.unwrap().unwrap();
        assert_eq!(reloaded.user_id(), user);
        assert_eq!(reloaded.refresh_metadata(), Some(meta));
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible() {
        let clock = Arc::new(ManualClock::at_timestamp(NOW));
        let store = InMemorySessionStore::with_clock(clock.clone());
        let user = UserId::new();
        let token = store
            .create(user, clock.now() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(store.count_for(user), 1);

        clock.advance(Duration::minutes(6));
        assert!(store.get(token).await.unwrap().is_none());
        assert_eq!(store.count_for(user), 0);
    }

    #[tokio::test]
    async fn destroyed_session_is_gone() {
        let store = InMemorySessionStore::new();
        let token = store
            .create(UserId::new(), Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        store.destroy(token).await.unwrap();
        assert!(store.get(token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn updating_unknown_session_fails() {
        let store = InMemorySessionStore::new();
        let token = store
            .create(UserId::new(), Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let record = store.get(token).await.unwrap().unwrap();
        store.destroy(token).await.unwrap();

        assert!(store.update(&record).await.is_err());
    }
}
