//! The user-info claim and the profile fields read from it.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ConnectError, ErrorCode};
use crate::token::{IdTokenClaim, claim_subject};

/// Raw user-info answer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserClaim(Value);

impl UserClaim {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn subject(&self) -> Option<String> {
        claim_subject(&self.0)
    }

    /// Lenient view of the profile fields.
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile::from_value(&self.0)
    }
}

/// Checks the user claim against the already validated ID-token claim.
///
/// # Errors
///
/// - `invalid-user-claim` when the claim is not a JSON object
/// - `invalid-user-claim-<code>` when the endpoint reported an error
/// - `incorrect-user-claim` when its `sub` differs from the ID token's
pub fn validate_user_claim(user: &UserClaim, id_claim: &IdTokenClaim) -> Result<(), ConnectError> {
    let Value::Object(fields) = &user.0 else {
        return Err(ErrorCode::InvalidUserClaim.into());
    };

    if let Some(error) = fields.get("error").filter(|e| !e.is_null()) {
        let code = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let message = fields
            .get("error_description")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map_or_else(|| code.clone(), str::to_string);
        return Err(ConnectError::new(ErrorCode::InvalidUserClaimWith(code), message));
    }

    if fields.get("sub") != id_claim.as_value().get("sub") {
        return Err(ErrorCode::IncorrectUserClaim.into());
    }

    Ok(())
}

/// Profile fields the identity resolver uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: Option<Address>,
}

impl UserProfile {
    fn from_value(value: &Value) -> Self {
        Self {
            email: field(value, "email"),
            given_name: field(value, "given_name"),
            family_name: field(value, "family_name"),
            phone: field(value, "phone").or_else(|| field(value, "phone_number")),
            shipping_address: value
                .get("shipping_address")
                .filter(|a| a.is_object())
                .map(Address::from_value),
        }
    }
}

/// Postal address as Stan sends it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub street_address: Option<String>,
    pub street_address_line2: Option<String>,
    pub locality: Option<String>,
    pub zip_code: Option<String>,
    pub region: Option<String>,
}

impl Address {
    fn from_value(value: &Value) -> Self {
        Self {
            firstname: field(value, "firstname"),
            lastname: field(value, "lastname"),
            street_address: field(value, "street_address"),
            street_address_line2: field(value, "street_address_line2"),
            locality: field(value, "locality"),
            zip_code: field(value, "zip_code"),
            region: field(value, "region"),
        }
    }
}

/// Non-empty string field; numbers are stringified (zip codes, phones).
fn field(value: &Value, key: &str) -> Option<String> {
    let text = match value.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
