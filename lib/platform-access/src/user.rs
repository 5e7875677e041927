//! Local user accounts.
//!
//! A local user is created the first time a Stan subject signs in and is
//! linked to that subject through the [`SUBJECT_IDENTITY_KEY`] meta entry.
//! Profile and address attributes live in the same free-form meta map.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stan_easy_connect_core::UserId;

use crate::error::{StoreError, StoreResult};

/// Meta entry linking a local account to a Stan subject.
pub const SUBJECT_IDENTITY_KEY: &str = "stan-easy-connect-subject-identity";

/// Meta entries holding the raw answers of the last login.
pub const LAST_TOKEN_RESPONSE_KEY: &str = "stan-easy-connect-last-token-response";
pub const LAST_ID_TOKEN_CLAIM_KEY: &str = "stan-easy-connect-last-id-token-claim";
pub const LAST_USER_CLAIM_KEY: &str = "stan-easy-connect-last-user-claim";

/// Site role given to accounts created through Stan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Shop customer, used when the commerce module is active.
    Customer,
    Subscriber,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Subscriber => "subscriber",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored local account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    id: UserId,
    login: String,
    email: String,
    display_name: String,
    nickname: String,
    first_name: String,
    last_name: String,
    role: Role,
    meta: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
}

impl LocalUser {
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns a meta entry.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Returns a meta entry holding a string.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }

    /// The Stan subject this account is linked to.
    #[must_use]
    pub fn subject_identity(&self) -> Option<&str> {
        self.meta_str(SUBJECT_IDENTITY_KEY)
    }
}

/// Attributes of an account about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub login: String,
    /// Random local password. Sign-in only ever goes through Stan.
    pub password: String,
    pub email: String,
    pub display_name: String,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// The site's user directory.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// First user, in store order, whose meta `key` equals `value`.
    async fn find_by_meta(&self, key: &str, value: &str)
    -> StoreResult<Option<LocalUser>>;

    async fn get(&self, id: UserId) -> StoreResult<Option<LocalUser>>;

    /// Id of the account whose login name is `login`.
    async fn find_id_by_login(&self, login: &str) -> StoreResult<Option<UserId>>;

    /// Id of the account registered with `email`.
    async fn find_id_by_email(&self, email: &str) -> StoreResult<Option<UserId>>;

    /// Inserts an account; login and email must both be free.
    async fn insert(&self, user: NewUser) -> StoreResult<LocalUser>;

    /// Writes meta entries, replacing existing values.
    async fn update_meta(
        &self,
        id: UserId,
        entries: Vec<(String, Value)>,
    ) -> StoreResult<()>;
}

/// [`UserStore`] kept in process memory.
///
/// Iteration follows insertion order. The password of a [`NewUser`] is not
/// kept.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<Vec<LocalUser>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
    ) -> StoreResult<std::sync::RwLockReadGuard<'_, Vec<LocalUser>>> {
        Ok(self.users.read().map_err(|e| StoreError::Unavailable {
            details: e.to_string(),
        })?)
    }

    fn write(
        &self,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, Vec<LocalUser>>> {
        Ok(self.users.write().map_err(|e| StoreError::Unavailable {
            details: e.to_string(),
        })?)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_meta(
        &self,
        key: &str,
        value: &str,
    ) -> StoreResult<Option<LocalUser>> {
        let users = self.read()?;
        Ok(users
            .iter()
            .find(|user| user.meta_str(key) == Some(value))
            .cloned())
    }

    async fn get(&self, id: UserId) -> StoreResult<Option<LocalUser>> {
        Ok(self.read()?.iter().find(|user| user.id == id).cloned())
    }

    async fn find_id_by_login(&self, login: &str) -> StoreResult<Option<UserId>> {
        let users = self.read()?;
        Ok(users
            .iter()
            .find(|user| user.login.eq_ignore_ascii_case(login))
            .map(LocalUser::id))
    }

    async fn find_id_by_email(&self, email: &str) -> StoreResult<Option<UserId>> {
        let users = self.read()?;
        Ok(users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .map(LocalUser::id))
    }

    async fn insert(&self, user: NewUser) -> StoreResult<LocalUser> {
        let mut users = self.write()?;

        if users.iter().any(|u| u.login.eq_ignore_ascii_case(&user.login)) {
            return Err(StoreError::Conflict {
                field: "login",
                value: user.login,
            }
            .into());
        }
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict {
                field: "email",
                value: user.email,
            }
            .into());
        }

        let stored = LocalUser {
            id: UserId::new(),
            login: user.login,
            email: user.email,
            display_name: user.display_name,
            nickname: user.nickname,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            meta: BTreeMap::new(),
            created_at: Utc::now(),
        };
        users.push(stored.clone());
        Ok(stored)
    }

    async fn update_meta(
        &self,
        id: UserId,
        entries: Vec<(String, Value)>,
    ) -> StoreResult<()> {
        let mut users = self.write()?;
        let user = users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(StoreError::UserNotFound { user_id: id })?;
        user.meta.extend(entries);
        Ok(())
    }
}
