//! Token claims: the contract every claims shape fulfils and the default shape
//!
//! The default [`RpcClaims`] are the registered JWT claims extended with the
//! credential type (`rpc_creds_type`) and the handler's auth metadata
//! (`rpc_auth_md`). Handlers that need a different payload implement
//! [`Claims`] for their own type and hand out a [`ClaimsDecoder`] for it.

use crate::credentials::{AuthMetadata, CredentialsType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tonic::Status;

/// Reasons a claims set is not currently valid
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token is expired")]
    Expired,

    #[error("token used before issued")]
    UsedBeforeIssued,

    #[error("token is not valid yet")]
    NotValidYet,

    #[error("{0}")]
    Invalid(String),
}

/// Contract for the payload of a verified token
pub trait Claims: Send + Sync + fmt::Debug + 'static {
    /// The authenticated subject; the first audience entry
    fn entity(&self) -> Result<String, Status>;

    fn credentials_type(&self) -> CredentialsType;

    fn auth_metadata(&self) -> Option<&AuthMetadata>;

    /// Self-validation; runs after the signature has been checked
    fn validate(&self) -> Result<(), ClaimsError>;

    fn as_any(&self) -> &dyn Any;
}

/// Decodes a verified token payload into a concrete [`Claims`] type
#[derive(Clone, Copy)]
pub struct ClaimsDecoder {
    decode: fn(serde_json::Value) -> Result<Arc<dyn Claims>, serde_json::Error>,
}

impl ClaimsDecoder {
    /// Decoder for any deserializable claims type
    pub fn of<T: Claims + DeserializeOwned>() -> Self {
        Self {
            decode: decode_as::<T>,
        }
    }

    pub fn decode(&self, payload: serde_json::Value) -> Result<Arc<dyn Claims>, serde_json::Error> {
        (self.decode)(payload)
    }
}

impl Default for ClaimsDecoder {
    fn default() -> Self {
        Self::of::<RpcClaims>()
    }
}

impl fmt::Debug for ClaimsDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimsDecoder").finish_non_exhaustive()
    }
}

fn decode_as<T: Claims + DeserializeOwned>(
    payload: serde_json::Value,
) -> Result<Arc<dyn Claims>, serde_json::Error> {
    let claims: T = serde_json::from_value(payload)?;
    Ok(Arc::new(claims))
}

/// Registered claim names (RFC 7519 §4.1)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Always serialized as an array; a bare string is accepted on input
    #[serde(
        rename = "aud",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub audience: Vec<String>,

    #[serde(
        rename = "exp",
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<i64>,

    #[serde(
        rename = "nbf",
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub not_before: Option<i64>,

    #[serde(
        rename = "iat",
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub issued_at: Option<i64>,

    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RegisteredClaims {
    /// Time-based checks for the claims that are present; absent ones pass
    pub fn validate_at(&self, now: i64) -> Result<(), ClaimsError> {
        if matches!(self.expires_at, Some(exp) if now >= exp) {
            return Err(ClaimsError::Expired);
        }
        if matches!(self.issued_at, Some(iat) if now < iat) {
            return Err(ClaimsError::UsedBeforeIssued);
        }
        if matches!(self.not_before, Some(nbf) if now < nbf) {
            return Err(ClaimsError::NotValidYet);
        }
        Ok(())
    }

    /// Entity named by the audience
    ///
    /// Only the first audience entry is meaningful.
    pub fn entity(&self) -> Result<String, Status> {
        self.audience
            .first()
            .cloned()
            .ok_or_else(|| Status::unauthenticated("invalid claims: no audience"))
    }
}

/// Default claims carried by tokens this server issues
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcClaims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,

    #[serde(rename = "rpc_creds_type", default)]
    pub credentials_type: CredentialsType,

    #[serde(rename = "rpc_auth_md", default, skip_serializing_if = "Option::is_none")]
    pub auth_metadata: Option<AuthMetadata>,
}

impl RpcClaims {
    /// Claims for a token scoped to exactly `entity`
    pub fn for_entity(
        entity: impl Into<String>,
        credentials_type: CredentialsType,
        auth_metadata: AuthMetadata,
    ) -> Self {
        Self {
            registered: RegisteredClaims {
                audience: vec![entity.into()],
                ..Default::default()
            },
            credentials_type,
            auth_metadata: (!auth_metadata.is_empty()).then_some(auth_metadata),
        }
    }
}

impl Claims for RpcClaims {
    fn entity(&self) -> Result<String, Status> {
        self.registered.entity()
    }

    fn credentials_type(&self) -> CredentialsType {
        self.credentials_type.clone()
    }

    fn auth_metadata(&self) -> Option<&AuthMetadata> {
        self.auth_metadata.as_ref()
    }

    fn validate(&self) -> Result<(), ClaimsError> {
        self.registered.validate_at(chrono::Utc::now().timestamp())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Downcast verified claims to the concrete type a handler supplied
pub fn downcast_claims<T: Claims>(claims: &dyn Claims) -> Option<&T> {
    claims.as_any().downcast_ref::<T>()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// NumericDate may carry a fraction; it is truncated to whole seconds
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumericDate {
        Seconds(i64),
        Fractional(f64),
    }

    Ok(match Option::<NumericDate>::deserialize(deserializer)? {
        Some(NumericDate::Seconds(value)) => Some(value),
        Some(NumericDate::Fractional(value)) => Some(value.trunc() as i64),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tonic::Code;

    #[test]
    fn test_for_entity_sets_single_audience() {
        let claims = RpcClaims::for_entity("robot-42", CredentialsType::API_KEY, AuthMetadata::new());

        assert_eq!(claims.entity().unwrap(), "robot-42");
        assert_eq!(claims.credentials_type(), CredentialsType::API_KEY);
        assert!(claims.auth_metadata().is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut md = AuthMetadata::new();
        md.insert("role".to_string(), "operator".to_string());
        let claims = RpcClaims::for_entity("robot-42", CredentialsType::API_KEY, md);

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            value,
            json!({
                "aud": ["robot-42"],
                "rpc_creds_type": "api-key",
                "rpc_auth_md": {"role": "operator"}
            })
        );
    }

    #[test]
    fn test_audience_accepts_bare_string() {
        let claims: RpcClaims =
            serde_json::from_value(json!({"aud": "robot-42", "rpc_creds_type": "api-key"})).unwrap();
        assert_eq!(claims.registered.audience, vec!["robot-42".to_string()]);
    }

    #[test]
    fn test_entity_reads_first_audience_only() {
        let claims: RpcClaims =
            serde_json::from_value(json!({"aud": ["first", "second"], "rpc_creds_type": "x"}))
                .unwrap();
        assert_eq!(claims.entity().unwrap(), "first");
    }

    #[test]
    fn test_missing_audience_is_unauthenticated() {
        let claims: RpcClaims = serde_json::from_value(json!({"rpc_creds_type": "x"})).unwrap();
        let status = claims.entity().unwrap_err();

        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "invalid claims: no audience");
    }

    #[test]
    fn test_validate_time_claims() {
        let now = 1_700_000_000;
        let mut registered = RegisteredClaims::default();
        assert_eq!(registered.validate_at(now), Ok(()));

        registered.expires_at = Some(now);
        assert_eq!(registered.validate_at(now), Err(ClaimsError::Expired));

        registered.expires_at = Some(now + 60);
        registered.issued_at = Some(now + 30);
        assert_eq!(registered.validate_at(now), Err(ClaimsError::UsedBeforeIssued));

        registered.issued_at = Some(now - 30);
        registered.not_before = Some(now + 30);
        assert_eq!(registered.validate_at(now), Err(ClaimsError::NotValidYet));

        registered.not_before = Some(now);
        assert_eq!(registered.validate_at(now), Ok(()));
    }

    #[test]
    fn test_fractional_numeric_dates_are_truncated() {
        let claims: RpcClaims = serde_json::from_value(json!({
            "aud": ["robot-42"],
            "rpc_creds_type": "external-jwt",
            "iat": 1_700_000_000.5,
            "nbf": 1_700_000_000.0,
            "exp": 1_700_000_600
        }))
        .unwrap();

        assert_eq!(claims.registered.issued_at, Some(1_700_000_000));
        assert_eq!(claims.registered.not_before, Some(1_700_000_000));
        assert_eq!(claims.registered.expires_at, Some(1_700_000_600));
        assert_eq!(claims.registered.validate_at(1_700_000_001), Ok(()));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let claims: RpcClaims = serde_json::from_value(json!({
            "aud": ["robot-42"],
            "rpc_creds_type": "api-key",
            "tenant": "acme"
        }))
        .unwrap();
        assert_eq!(claims.entity().unwrap(), "robot-42");
    }

    #[test]
    fn test_default_decoder_downcasts_to_rpc_claims() {
        let decoded = ClaimsDecoder::default()
            .decode(json!({"aud": ["robot-42"], "rpc_creds_type": "api-key"}))
            .unwrap();

        let claims = downcast_claims::<RpcClaims>(decoded.as_ref()).unwrap();
        assert_eq!(claims.credentials_type, CredentialsType::API_KEY);
    }
}
