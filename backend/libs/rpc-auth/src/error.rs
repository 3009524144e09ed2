//! Error types for authentication setup and credential handlers

use crate::credentials::CredentialsType;
use thiserror::Error;
use tonic::Status;

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised while building the auth server or verifying credentials
#[derive(Debug, Error)]
pub enum AuthError {
    /// Handler failure that already carries a gRPC status; surfaced unchanged
    #[error("{}", .0.message())]
    Rpc(#[from] Status),

    /// Presented credentials do not match
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Entity is not served by the handler
    #[error("cannot authenticate entity {0:?}")]
    UnknownEntity(String),

    /// Signing key could not be parsed or generated
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),

    /// Token could not be signed
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// A handler is already registered for the credential type
    #[error("auth handler already registered for {0:?}")]
    DuplicateCredentialsType(CredentialsType),

    /// Server options are inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// Arbitrary handler failure (identity provider unreachable, ...)
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl AuthError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Convert a credential-verification failure into the status seen by the caller
    ///
    /// Structured statuses pass through; everything else is permission denied.
    pub fn into_permission_status(self) -> Status {
        match self {
            AuthError::Rpc(status) => status,
            other => Status::permission_denied(format!("failed to authenticate: {other}")),
        }
    }
}
