//! Maps a validated Stan claim onto a local account.
//!
//! Lookup order: the account linked to the subject, then an account whose
//! login or email equals the claim's email (re-bound to the subject), then a
//! freshly created one.

use std::sync::Arc;

use rand::Rng;
use rootcause::Report;
use serde_json::{Value, json};
use stan_easy_connect_core::{ActivityLog, UserId};
use stan_easy_connect_oidc::{Address, ConnectError, ErrorCode, UserClaim};
use tracing::{error, info, warn};

use crate::commerce::Commerce;
use crate::error::{StoreError, StoreResult};
use crate::user::{LocalUser, NewUser, Role, SUBJECT_IDENTITY_KEY, UserStore};

/// Country written into billing and shipping addresses.
pub const ADDRESS_COUNTRY: &str = "FR";

const PASSWORD_LENGTH: usize = 32;
const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()-_[]{}<>~`+=,.;:/?|";

/// Finds, re-binds or creates the local account for a Stan subject.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    commerce: Arc<dyn Commerce>,
    activity: Arc<dyn ActivityLog>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        commerce: Arc<dyn Commerce>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            users,
            commerce,
            activity,
        }
    }

    /// The account linked to `subject`, first in store order.
    ///
    /// # Errors
    ///
    /// Propagates user-store failures.
    pub async fn find_by_subject(
        &self,
        subject: &str,
    ) -> StoreResult<Option<LocalUser>> {
        self.users.find_by_meta(SUBJECT_IDENTITY_KEY, subject).await
    }

    /// The account whose login name, or failing that email, is `email`.
    ///
    /// # Errors
    ///
    /// Propagates user-store failures.
    pub async fn find_user_id_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<UserId>> {
        if let Some(id) = self.users.find_id_by_login(email).await? {
            return Ok(Some(id));
        }
        self.users.find_id_by_email(email).await
    }

    /// Resolves the claim to an account, creating one when needed.
    ///
    /// A subject-linked account has its address refreshed from the claim.
    ///
    /// # Errors
    ///
    /// `invalid-user` when the lookup fails, otherwise whatever
    /// [`create`](Self::create) returns.
    pub async fn resolve(&self, subject: &str, claim: &UserClaim) -> Result<LocalUser, ConnectError> {
        let linked = self.find_by_subject(subject).await.map_err(|report| {
            error!(error = %report, subject, "subject lookup failed");
            ConnectError::from(ErrorCode::InvalidUser)
        })?;

        let Some(user) = linked else {
            return self.create(subject, claim).await;
        };

        let profile = claim.profile();
        let first = profile.given_name.as_deref().unwrap_or(user.first_name());
        let last = profile.family_name.as_deref().unwrap_or(user.last_name());
        if let Err(report) = self
            .update_address(user.id(), profile.shipping_address.as_ref(), first, last)
            .await
        {
            warn!(error = %report, user_id = %user.id(), "address refresh failed");
        }

        self.reload(user.id()).await
    }

    /// Creates the account for `subject`, or re-binds the account that
    /// already uses the claim's email.
    ///
    /// # Errors
    ///
    /// - `fail-retrieve-user` when the claim carries no email
    /// - `failed-user-creation` when the store rejects the account
    /// - `invalid-user` when a re-bound account vanished meanwhile
    pub async fn create(&self, subject: &str, claim: &UserClaim) -> Result<LocalUser, ConnectError> {
        let profile = claim.profile();
        let Some(email) = profile.email.clone() else {
            self.activity.record(
                "fail-retrieve-user",
                "Failed to retrieve claim because email is missing",
            );
            return Err(ErrorCode::FailRetrieveUser.into());
        };

        let existing = self.find_user_id_by_email(&email).await.map_err(|report| {
            self.creation_failed(&report)
        })?;
        if let Some(id) = existing {
            return self
                .rebind(id, subject, profile.shipping_address.as_ref())
                .await;
        }

        let first_name = profile.given_name.clone().unwrap_or_default();
        let last_name = profile.family_name.clone().unwrap_or_default();
        let role = if self.commerce.is_active() {
            Role::Customer
        } else {
            Role::Subscriber
        };

        let user = self
            .users
            .insert(NewUser {
                login: email.clone(),
                password: generate_password(),
                email,
                display_name: first_name.clone(),
                nickname: first_name.clone(),
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                role,
            })
            .await
            .map_err(|report| self.creation_failed(&report))?;

        let mut entries = vec![(SUBJECT_IDENTITY_KEY.to_string(), json!(subject))];
        if let Some(phone) = &profile.phone {
            for key in ["mobile", "billing_phone", "shipping_phone"] {
                entries.push((key.to_string(), json!(phone)));
            }
        }
        self.users
            .update_meta(user.id(), entries)
            .await
            .map_err(|report| self.creation_failed(&report))?;

        self.update_address(
            user.id(),
            profile.shipping_address.as_ref(),
            &first_name,
            &last_name,
        )
        .await
        .map_err(|report| self.creation_failed(&report))?;

        self.activity.record(
            "success-create-user",
            &format!("New user created: {} ({})", user.login(), user.id()),
        );
        info!(user_id = %user.id(), role = %role, "created local user");

        self.reload(user.id()).await
    }

    /// Writes billing and shipping address fields when a shop is active and
    /// the claim carries an address. Without one the stored fields are kept.
    ///
    /// Missing names fall back to the given defaults. The country is always
    /// [`ADDRESS_COUNTRY`].
    ///
    /// # Errors
    ///
    /// Propagates user-store failures.
    pub async fn update_address(
        &self,
        user_id: UserId,
        address: Option<&Address>,
        default_first: &str,
        default_last: &str,
    ) -> StoreResult<()> {
        if !self.commerce.is_active() {
            return Ok(());
        }

        let Some(address) = address else {
            return Ok(());
        };
        let first = address.firstname.as_deref().unwrap_or(default_first);
        let last = address.lastname.as_deref().unwrap_or(default_last);

        let mut entries = Vec::with_capacity(18);
        for prefix in ["billing", "shipping"] {
            let fields = [
                ("first_name", first),
                ("last_name", last),
                ("address_1", address.street_address.as_deref().unwrap_or_default()),
                ("address_2", address.street_address_line2.as_deref().unwrap_or_default()),
                ("city", address.locality.as_deref().unwrap_or_default()),
                ("postcode", address.zip_code.as_deref().unwrap_or_default()),
                ("country", ADDRESS_COUNTRY),
                ("state", address.region.as_deref().unwrap_or_default()),
            ];
            entries.extend(
                fields
                    .into_iter()
                    .map(|(field, value)| (format!("{prefix}_{field}"), Value::from(value))),
            );
        }

        self.users.update_meta(user_id, entries).await
    }

    /// Checks that `user` still exists in the store.
    ///
    /// # Errors
    ///
    /// `invalid-user` otherwise.
    pub async fn validate_user(&self, user: &LocalUser) -> Result<(), ConnectError> {
        match self.users.get(user.id()).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                self.activity
                    .record("user-invalid", &format!("Invalid user: {}.", user.id()));
                Err(ErrorCode::InvalidUser.into())
            }
            Err(report) => {
                error!(error = %report, user_id = %user.id(), "user validation failed");
                Err(ErrorCode::InvalidUser.into())
            }
        }
    }

    async fn rebind(
        &self,
        id: UserId,
        subject: &str,
        address: Option<&Address>,
    ) -> Result<LocalUser, ConnectError> {
        self.users
            .update_meta(id, vec![(SUBJECT_IDENTITY_KEY.to_string(), json!(subject))])
            .await
            .map_err(|report| self.creation_failed(&report))?;

        let user = self.reload(id).await?;
        self.update_address(id, address, user.first_name(), user.last_name())
            .await
            .map_err(|report| self.creation_failed(&report))?;

        self.activity
            .record("update-user", &format!("Update user {id} with sub {subject}"));

        self.reload(id).await
    }

    async fn reload(&self, id: UserId) -> Result<LocalUser, ConnectError> {
        match self.users.get(id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(ErrorCode::InvalidUser.into()),
            Err(report) => {
                error!(error = %report, user_id = %id, "user reload failed");
                Err(ErrorCode::InvalidUser.into())
            }
        }
    }

    fn creation_failed(&self, report: &Report<StoreError>) -> ConnectError {
        self.activity
            .record("fail-create-user", &format!("Failed to create user: {report}"));
        ErrorCode::FailedUserCreation.into()
    }
}

/// Random local password. Nobody ever types it.
fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..PASSWORD_LENGTH)
        .map(|_| PASSWORD_CHARSET[rng.random_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::{DisabledCommerce, InMemoryCommerce};
    use crate::user::InMemoryUserStore;
    use serde_json::json;
    use stan_easy_connect_core::MemoryActivityLog;

    struct Fixture {
        resolver: IdentityResolver,
        users: Arc<InMemoryUserStore>,
        activity: Arc<MemoryActivityLog>,
    }

    fn fixture(commerce: Arc<dyn Commerce>) -> Fixture {
        let users = Arc::new(InMemoryUserStore::new());
        let activity = Arc::new(MemoryActivityLog::new());
        let resolver = IdentityResolver::new(users.clone(), commerce, activity.clone());
        Fixture {
            resolver,
            users,
            activity,
        }
    }

    fn claim(sub: &str, email: &str) -> UserClaim {
        UserClaim::from_value(json!({
            "sub": sub,
            "email": email,
            "given_name": "A",
            "family_name": "B",
            "phone": "0612345678",
            "shipping_address": {
                "street_address": "1 rue de la Paix",
                "locality": "Paris",
                "zip_code": "75002",
                "region": "IDF",
                "country": "BE"
            }
        }))
    }

    async fn existing(users: &InMemoryUserStore, email: &str) -> LocalUser {
        users
            .insert(NewUser {
                login: email.to_string(),
                password: "pw".to_string(),
                email: email.to_string(),
                display_name: "Old".to_string(),
                nickname: "Old".to_string(),
                first_name: "Old".to_string(),
                last_name: "Name".to_string(),
                role: Role::Subscriber,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn creates_subscriber_without_shop() {
        let f = fixture(Arc::new(DisabledCommerce));

        let user = f.resolver.resolve("stan|1", &claim("stan|1", "a@b.com")).await.unwrap();

        assert_eq!(user.subject_identity(), Some("stan|1"));
        assert_eq!(user.role(), Role::Subscriber);
        assert_eq!(user.login(), "a@b.com");
        assert_eq!(user.first_name(), "A");
        assert_eq!(user.last_name(), "B");
        assert_eq!(user.display_name(), "A");
        assert_eq!(user.meta_str("mobile"), Some("0612345678"));
        assert_eq!(user.meta_str("shipping_phone"), Some("0612345678"));
        // No shop, no address fields.
        assert_eq!(user.meta("billing_city"), None);
        assert!(f.activity.contains_kind("success-create-user"));
    }

    #[tokio::test]
    async fn creates_customer_with_french_address_when_shop_is_active() {
        let f = fixture(Arc::new(InMemoryCommerce::new("/checkout")));

        let user = f.resolver.resolve("stan|1", &claim("stan|1", "a@b.com")).await.unwrap();

        assert_eq!(user.role(), Role::Customer);
        assert_eq!(user.meta_str("billing_city"), Some("Paris"));
        assert_eq!(user.meta_str("shipping_postcode"), Some("75002"));
        assert_eq!(user.meta_str("billing_country"), Some("FR"));
        assert_eq!(user.meta_str("shipping_country"), Some("FR"));
        // Claim has no address names; the profile names fill in.
        assert_eq!(user.meta_str("billing_first_name"), Some("A"));
        assert_eq!(user.meta_str("shipping_last_name"), Some("B"));
        assert_eq!(user.meta_str("billing_address_2"), Some(""));
    }

    #[tokio::test]
    async fn missing_email_is_fail_retrieve_user() {
        let f = fixture(Arc::new(DisabledCommerce));
        let claim = UserClaim::from_value(json!({ "sub": "stan|1" }));

        let err = f.resolver.resolve("stan|1", &claim).await.unwrap_err();

        assert_eq!(err.code(), &ErrorCode::FailRetrieveUser);
        assert_eq!(err.message(), "Email is missing, please set one in Stan");
        assert!(f.users.is_empty());
        assert!(f.activity.contains_kind("fail-retrieve-user"));
    }

    #[tokio::test]
    async fn email_match_rebinds_instead_of_duplicating() {
        let f = fixture(Arc::new(InMemoryCommerce::new("/checkout")));
        let old = existing(&f.users, "a@b.com").await;

        let user = f.resolver.resolve("stan|new", &claim("stan|new", "a@b.com")).await.unwrap();

        assert_eq!(user.id(), old.id());
        assert_eq!(f.users.len(), 1);
        assert_eq!(user.subject_identity(), Some("stan|new"));
        assert_eq!(user.meta_str("billing_city"), Some("Paris"));
        // Re-bound accounts keep their stored names as address defaults.
        assert_eq!(user.meta_str("billing_first_name"), Some("Old"));
        assert!(f.activity.contains_kind("update-user"));
    }

    #[tokio::test]
    async fn email_lookup_checks_login_then_email() {
        let f = fixture(Arc::new(DisabledCommerce));
        let user = f
            .users
            .insert(NewUser {
                login: "zoe".to_string(),
                password: "pw".to_string(),
                email: "zoe@example.com".to_string(),
                display_name: String::new(),
                nickname: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                role: Role::Subscriber,
            })
            .await
            .unwrap();

        assert_eq!(
            f.resolver.find_user_id_by_email("zoe@example.com").await.unwrap(),
            Some(user.id())
        );
        assert_eq!(f.resolver.find_user_id_by_email("zoe@other.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn subject_match_refreshes_address() {
        let shop = Arc::new(InMemoryCommerce::new("/checkout"));
        let f = fixture(shop);
        let first = f.resolver.resolve("stan|1", &claim("stan|1", "a@b.com")).await.unwrap();

        let moved = UserClaim::from_value(json!({
            "sub": "stan|1",
            "email": "a@b.com",
            "given_name": "A",
            "family_name": "B",
            "shipping_address": { "locality": "Lyon", "zip_code": "69001" }
        }));
        let second = f.resolver.resolve("stan|1", &moved).await.unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.meta_str("shipping_city"), Some("Lyon"));
        assert_eq!(f.users.len(), 1);
    }

    #[tokio::test]
    async fn login_without_address_keeps_the_stored_one() {
        let f = fixture(Arc::new(InMemoryCommerce::new("/checkout")));
        let first = f.resolver.resolve("stan|1", &claim("stan|1", "a@b.com")).await.unwrap();
        assert_eq!(first.meta_str("billing_city"), Some("Paris"));

        let bare = UserClaim::from_value(json!({ "sub": "stan|1", "email": "a@b.com" }));
        let second = f.resolver.resolve("stan|1", &bare).await.unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.meta_str("billing_city"), Some("Paris"));
        assert_eq!(second.meta_str("shipping_postcode"), Some("75002"));
    }

    #[tokio::test]
    async fn address_update_is_noop_without_shop() {
        let f = fixture(Arc::new(DisabledCommerce));
        let user = existing(&f.users, "a@b.com").await;

        f.resolver
            .update_address(user.id(), Some(&Address::default()), "A", "B")
            .await
            .unwrap();

        let reloaded = f.users.get(user.id()).await.unwrap().unwrap();
        assert_eq!(reloaded.meta("billing_country"), None);
    }

    #[tokio::test]
    async fn validate_user_rejects_unknown_account() {
        let f = fixture(Arc::new(DisabledCommerce));
        let user = existing(&f.users, "a@b.com").await;
        assert!(f.resolver.validate_user(&user).await.is_ok());

        let other = fixture(Arc::new(DisabledCommerce));
        let err = other.resolver.validate_user(&user).await.unwrap_err();
        assert_eq!(err.code(), &ErrorCode::InvalidUser);
    }

    #[test]
    fn passwords_are_long_and_distinct() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.chars().count(), 32);
        assert_ne!(a, b);
        assert!(!PASSWORD_CHARSET.contains(&b' '));
    }
}
