//! Token-endpoint responses and the ID-token claim.
//!
//! The ID token's signature is not verified: it arrives directly from the
//! token endpoint over TLS, and only its payload segment is read.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ConnectError, ErrorCode};
use crate::transport::ProviderResponse;

/// Standard alphabet, tolerant of missing padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Parsed token-endpoint answer.
///
/// Every field is optional here; [`validate_token_set`] decides which ones
/// the flow cannot do without.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Seconds until the access token expires.
    #[serde(default, deserialize_with = "lenient_seconds", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Seconds until the refresh token expires.
    #[serde(default, deserialize_with = "lenient_seconds", skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<i64>,
}

impl TokenSet {
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        self.expires_in.unwrap_or_default()
    }

    #[must_use]
    pub fn refresh_expires_in(&self) -> i64 {
        self.refresh_expires_in.unwrap_or_default()
    }
}

/// Accepts `3600`, `"3600"` or `null`.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Turns a raw token-endpoint answer into a [`TokenSet`].
///
/// A provider `error` field is passed through as the error code, with
/// `error_description` (or the code itself) as the message.
///
/// # Errors
///
/// `missing-token-body` for an empty body, the provider's own code when it
/// reports one, `invalid-token-response` when the body is not a JSON object.
pub fn parse_token_response(response: &ProviderResponse) -> Result<TokenSet, ConnectError> {
    let Some(body) = response.body.as_deref() else {
        return Err(ErrorCode::MissingTokenBody.into());
    };

    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let code = text(error);
        let message = value
            .get("error_description")
            .map(text)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| code.clone());
        return Err(ConnectError::new(ErrorCode::Provider(code), message));
    }

    if !value.is_object() {
        return Err(ErrorCode::InvalidTokenResponse.into());
    }

    serde_json::from_value(value).map_err(|_| ErrorCode::InvalidTokenResponse.into())
}

/// Requires an `id_token` and a `Bearer` token type.
///
/// # Errors
///
/// `invalid-token-response` otherwise.
pub fn validate_token_set(tokens: &TokenSet) -> Result<(), ConnectError> {
    let bearer = tokens
        .token_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("bearer"));

    if tokens.id_token.is_none() || !bearer {
        return Err(ErrorCode::InvalidTokenResponse.into());
    }
    Ok(())
}

/// Decoded payload of the ID token.
///
/// Holds `Value::Null` when the payload could not be decoded, which
/// [`validate_id_token_claim`] then rejects.
#[derive(Debug, Clone, PartialEq)]
pub struct IdTokenClaim(Value);

impl IdTokenClaim {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The `sub` claim, if present and non-empty.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        claim_subject(&self.0)
    }
}

/// Decodes the middle segment of the ID token.
///
/// # Errors
///
/// `missing-id-token` without an ID token, `missing-identity` when the token
/// has no payload segment. An undecodable payload is not an error here.
pub fn decode_id_token_claim(tokens: &TokenSet) -> Result<IdTokenClaim, ConnectError> {
    let id_token = tokens
        .id_token
        .as_deref()
        .ok_or_else(|| ConnectError::from(ErrorCode::MissingIdToken))?;

    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ConnectError::from(ErrorCode::MissingIdentity))?;

    let normalized = payload.replace('-', "+").replace('_', "/");
    let value = PAYLOAD_ENGINE
        .decode(normalized)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or(Value::Null);

    Ok(IdTokenClaim(value))
}

/// Requires a JSON object with a non-empty `sub`.
///
/// # Errors
///
/// `bad-id-token-claim` for a non-object or empty object, `missing-sub`
/// without a subject.
pub fn validate_id_token_claim(claim: &IdTokenClaim) -> Result<(), ConnectError> {
    if claim.0.as_object().is_none_or(serde_json::Map::is_empty) {
        return Err(ErrorCode::BadIdTokenClaim.into());
    }
    if claim.subject().is_none() {
        return Err(ErrorCode::MissingSub.into());
    }
    Ok(())
}

pub(crate) fn claim_subject(value: &Value) -> Option<String> {
    match value.get("sub")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
