//! Error types for certificate handling

use std::path::PathBuf;
use thiserror::Error;

/// Result type for certificate operations
pub type TlsResult<T> = std::result::Result<T, TlsError>;

/// Errors that can occur while loading, generating or inspecting certificates
#[derive(Debug, Error)]
pub enum TlsError {
    /// Required environment variable is not set
    #[error("{var_name} not set: {hint}")]
    MissingEnvVar { var_name: String, hint: String },

    /// Certificate or key file could not be read
    #[error("Failed to read {path:?}: {source}")]
    CertificateReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PEM envelope is malformed
    #[error("Invalid PEM: {0}")]
    Pem(#[from] pem::PemError),

    /// PEM block does not hold a certificate
    #[error("Expected a CERTIFICATE PEM block, found {0:?}")]
    UnexpectedPemTag(String),

    /// DER payload is not a parseable X.509 certificate
    #[error("X.509 parse failed: {0}")]
    CertificateParseError(String),

    /// Development certificate generation failed
    #[error("Certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),
}
