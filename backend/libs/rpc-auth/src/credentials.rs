//! Credential types, the handler contract, and the handler registry
//!
//! A [`CredentialsType`] tag selects which [`AuthHandler`] verifies raw
//! credentials on `Authenticate` and which one vouches for the entity of a
//! token on every later call. Handlers may additionally supply the key used to
//! verify their tokens ([`TokenVerificationKeyProvider`]) or the claims shape
//! to decode them into ([`TokenCustomClaimProvider`]).

use crate::claims::{Claims, ClaimsDecoder};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tonic::Status;

/// Opaque key/value data a handler attaches to an issued token
pub type AuthMetadata = HashMap<String, String>;

/// Tag identifying a credential verification scheme
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct CredentialsType(Cow<'static, str>);

impl CredentialsType {
    /// Shared-secret API keys
    pub const API_KEY: CredentialsType = CredentialsType(Cow::Borrowed("api-key"));

    /// Tokens minted by an external identity provider
    pub const EXTERNAL: CredentialsType = CredentialsType(Cow::Borrowed("external-jwt"));

    pub fn new(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CredentialsType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CredentialsType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Verified identity bound to a call
///
/// The concrete shape is chosen by the handler that produced it; consumers
/// downcast to the type their handler documents.
#[derive(Clone)]
pub struct AuthEntity(Arc<dyn Any + Send + Sync>);

impl AuthEntity {
    pub fn new<T: Any + Send + Sync>(entity: T) -> Self {
        Self(Arc::new(entity))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Convenience for handlers whose entity is its name
    pub fn name(&self) -> Option<&str> {
        self.downcast_ref::<String>().map(String::as_str)
    }
}

impl fmt::Debug for AuthEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.debug_tuple("AuthEntity").field(&name).finish(),
            None => f.debug_tuple("AuthEntity").field(&"<opaque>").finish(),
        }
    }
}

/// Key material used to check the signature of a token
pub struct TokenVerificationKey {
    pub key: DecodingKey,
    /// Algorithms the token header may declare for this key
    pub algorithms: Vec<Algorithm>,
}

/// A credential verification scheme
///
/// Implementations may block on I/O (e.g. an identity provider). The call's
/// deadline applies; implementations are expected to observe cancellation.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Verify raw credentials for `entity`, returning metadata to embed in the token
    async fn authenticate(&self, entity: &str, payload: &[u8]) -> Result<AuthMetadata>;

    /// Vouch for the entity named by verified claims, returning the value bound to the call
    async fn verify_entity(
        &self,
        claims: &dyn Claims,
        entity: &str,
    ) -> std::result::Result<AuthEntity, Status>;

    /// Supplies the key for tokens of this type instead of the server key
    fn token_verification_key_provider(&self) -> Option<&dyn TokenVerificationKeyProvider> {
        None
    }

    /// Supplies the claims shape for tokens of this type instead of [`crate::RpcClaims`]
    fn custom_claims_provider(&self) -> Option<&dyn TokenCustomClaimProvider> {
        None
    }
}

/// Resolves the verification key of an (externally issued) token
#[async_trait]
pub trait TokenVerificationKeyProvider: Send + Sync {
    /// `header` and `claims` are not yet verified
    async fn token_verification_key(
        &self,
        header: &Header,
        claims: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<TokenVerificationKey, Status>;
}

/// Supplies a custom claims shape to decode tokens into
pub trait TokenCustomClaimProvider: Send + Sync {
    /// Must return `Some`; `None` is rejected as an internal error
    fn create_claims(&self) -> Option<ClaimsDecoder>;
}

/// Registry of handlers keyed by credential type
///
/// Built once at server construction and read-only afterwards.
#[derive(Clone, Default)]
pub struct AuthHandlers {
    handlers: HashMap<CredentialsType, Arc<dyn AuthHandler>>,
}

impl AuthHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `for_type`; a second registration is rejected
    pub fn register(
        &mut self,
        for_type: CredentialsType,
        handler: Arc<dyn AuthHandler>,
    ) -> Result<()> {
        if self.handlers.contains_key(&for_type) {
            return Err(AuthError::DuplicateCredentialsType(for_type));
        }
        self.handlers.insert(for_type, handler);
        Ok(())
    }

    /// Look up the handler for `for_type`
    ///
    /// An unknown scheme is an invalid argument.
    pub fn lookup(
        &self,
        for_type: &CredentialsType,
    ) -> std::result::Result<&Arc<dyn AuthHandler>, Status> {
        self.handlers
            .get(for_type)
            .ok_or_else(|| Status::invalid_argument(format!("no auth handler for {:?}", for_type.as_str())))
    }

    pub fn contains(&self, for_type: &CredentialsType) -> bool {
        self.handlers.contains_key(for_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
