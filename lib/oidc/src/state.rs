//! One-time CSRF `state` tokens.
//!
//! A token is issued when the authorization URL is built and must still be
//! live in the cache when the provider redirects back. Entries expire after
//! [`STATE_TTL_MINUTES`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::CsrfToken;
use stan_easy_connect_core::{Clock, SystemClock};

/// Lifetime of an issued state token.
pub const STATE_TTL_MINUTES: i64 = 10;

const STATE_KEY_PREFIX: &str = "stan-easy-connect-state--";

/// Key-value cache with per-entry expiry.
///
/// The host's transient cache sits behind this trait. Implementations must
/// not return entries whose TTL has elapsed.
#[async_trait]
pub trait StateCache: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration);

    async fn get(&self, key: &str) -> Option<String>;

    async fn delete(&self, key: &str);
}

/// Process-local [`StateCache`].
pub struct InMemoryStateCache {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for InMemoryStateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateCache for InMemoryStateCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
    }

    async fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone())
    }

    async fn delete(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }
}

/// An issued state value, as sent in the authorization URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateToken(String);

impl StateToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues and checks state tokens against a [`StateCache`].
#[derive(Clone)]
pub struct StateRegistry {
    cache: Arc<dyn StateCache>,
    ttl: Duration,
}

impl StateRegistry {
    #[must_use]
    pub fn new(cache: Arc<dyn StateCache>) -> Self {
        Self {
            cache,
            ttl: Duration::minutes(STATE_TTL_MINUTES),
        }
    }

    /// Generates a fresh random token and caches it for the TTL.
    pub async fn issue(&self) -> StateToken {
        let token = CsrfToken::new_random().secret().clone();
        self.cache
            .set(&cache_key(&token), token.clone(), self.ttl)
            .await;
        StateToken(token)
    }

    /// Whether `state` was issued and has not expired or been invalidated.
    ///
    /// Does not consume the token.
    pub async fn validate(&self, state: &str) -> bool {
        if state.is_empty() {
            return false;
        }
        self.cache
            .get(&cache_key(state))
            .await
            .is_some_and(|value| !value.is_empty())
    }

    /// Removes `state` so it can never validate again.
    pub async fn invalidate(&self, state: &str) {
        self.cache.delete(&cache_key(state)).await;
    }
}

fn cache_key(state: &str) -> String {
    format!("{STATE_KEY_PREFIX}{state}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stan_easy_connect_core::ManualClock;

    fn registry_with_clock() -> (StateRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
        let cache = Arc::new(InMemoryStateCache::with_clock(clock.clone()));
        (StateRegistry::new(cache), clock)
    }

    #[tokio::test]
    async fn issued_state_validates() {
        let (registry, _) = registry_with_clock();
        let state = registry.issue().await;

        assert!(!state.as_str().is_empty());
        assert!(registry.validate(state.as_str()).await);
        // Validation alone does not consume.
        assert!(registry.validate(state.as_str()).await);
    }

    #[tokio::test]
    async fn issued_states_are_distinct() {
        let (registry, _) = registry_with_clock();
        let a = registry.issue().await;
        let b = registry.issue().await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unknown_or_empty_state_is_rejected() {
        let (registry, _) = registry_with_clock();
        assert!(!registry.validate("never-issued").await);
        assert!(!registry.validate("").await);
    }

    #[tokio::test]
    async fn state_expires_after_ttl() {
        let (registry, clock) = registry_with_clock();
        let state = registry.issue().await;

        clock.advance(Duration::minutes(9));
        assert!(registry.validate(state.as_str()).await);

        clock.advance(Duration::minutes(2));
        assert!(!registry.validate(state.as_str()).await);
    }

    #[tokio::test]
    async fn invalidated_state_is_rejected() {
        let (registry, _) = registry_with_clock();
        let state = registry.issue().await;

        registry.invalidate(state.as_str()).await;
        assert!(!registry.validate(state.as_str()).await);
    }

    #[tokio::test]
    async fn cache_keys_carry_prefix() {
        let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
        let cache = Arc::new(InMemoryStateCache::with_clock(clock));
        let registry = StateRegistry::new(cache.clone());

        let state = registry.issue().await;
        let key = format!("stan-easy-connect-state--{state}");
        assert_eq!(cache.get(&key).await.as_deref(), Some(state.as_str()));
    }
}
