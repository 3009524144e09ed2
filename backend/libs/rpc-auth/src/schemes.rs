//! Built-in credential schemes

use crate::claims::Claims;
use crate::credentials::{
    AuthEntity, AuthHandler, AuthMetadata, TokenVerificationKey, TokenVerificationKeyProvider,
};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use serde_json::{Map, Value};
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use tonic::Status;

/// Shared-secret scheme: a fixed set of entities and one key
///
/// Usually registered for [`crate::CredentialsType::API_KEY`].
pub struct ApiKeyAuthHandler {
    entities: HashSet<String>,
    key: Vec<u8>,
}

impl ApiKeyAuthHandler {
    pub fn new<I, S>(entities: I, key: impl Into<Vec<u8>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entities: entities.into_iter().map(Into::into).collect(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl AuthHandler for ApiKeyAuthHandler {
    async fn authenticate(&self, entity: &str, payload: &[u8]) -> Result<AuthMetadata> {
        if !self.entities.contains(entity) {
            return Err(AuthError::UnknownEntity(entity.to_string()));
        }
        if !bool::from(payload.ct_eq(&self.key)) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(AuthMetadata::new())
    }

    async fn verify_entity(
        &self,
        _claims: &dyn Claims,
        entity: &str,
    ) -> std::result::Result<AuthEntity, Status> {
        if self.entities.contains(entity) {
            Ok(AuthEntity::new(entity.to_string()))
        } else {
            Err(Status::unauthenticated(format!(
                "cannot authenticate entity {entity:?}"
            )))
        }
    }
}

/// Tokens issued by an external identity provider with a known RSA public key
///
/// Raw credentials are never accepted; callers present the provider's token
/// directly as their bearer token. The entity is the token's first audience.
pub struct ExternalTokenHandler {
    key: DecodingKey,
    algorithms: Vec<Algorithm>,
}

impl ExternalTokenHandler {
    pub fn from_rsa_pem(public_key_pem: &str, algorithms: Vec<Algorithm>) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::InvalidSigningKey(format!("Failed to parse RSA public key: {e}")))?;
        if algorithms.is_empty() {
            return Err(AuthError::config("external token handler needs at least one algorithm"));
        }
        Ok(Self { key, algorithms })
    }
}

#[async_trait]
impl AuthHandler for ExternalTokenHandler {
    async fn authenticate(&self, _entity: &str, _payload: &[u8]) -> Result<AuthMetadata> {
        Err(AuthError::Rpc(Status::permission_denied(
            "external credentials cannot be exchanged for a token",
        )))
    }

    async fn verify_entity(
        &self,
        _claims: &dyn Claims,
        entity: &str,
    ) -> std::result::Result<AuthEntity, Status> {
        Ok(AuthEntity::new(entity.to_string()))
    }

    fn token_verification_key_provider(&self) -> Option<&dyn TokenVerificationKeyProvider> {
        Some(self)
    }
}

#[async_trait]
impl TokenVerificationKeyProvider for ExternalTokenHandler {
    async fn token_verification_key(
        &self,
        header: &Header,
        _claims: &Map<String, Value>,
    ) -> std::result::Result<TokenVerificationKey, Status> {
        if !self.algorithms.contains(&header.alg) {
            return Err(Status::unauthenticated(format!(
                "unexpected signing method {:?}",
                header.alg
            )));
        }
        Ok(TokenVerificationKey {
            key: self.key.clone(),
            algorithms: self.algorithms.clone(),
        })
    }
}
