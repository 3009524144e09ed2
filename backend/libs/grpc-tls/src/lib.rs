//! gRPC TLS helpers for certificate-authenticated peers
//!
//! **Features**:
//! - Server TLS configuration with an optional client CA (mTLS)
//! - SAN extraction from verified peer certificates
//! - Development CA/server/client certificate generation

use std::fs;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};
use tracing::{info, warn};

pub mod cert_generation;
pub mod error;
pub mod san_validation;

pub use cert_generation::{
    generate_client_certificate, generate_dev_certificates, write_cert_bundle, CertificateBundle,
    ClientCertificate,
};
pub use error::{TlsError, TlsResult};
pub use san_validation::{
    certificate_der_from_pem, dns_name_matches, dns_names, extract_san_entries, SanEntry,
};

/// TLS configuration for a gRPC server that accepts client certificates
#[derive(Clone)]
pub struct GrpcServerTlsConfig {
    /// Server certificate (PEM format)
    pub cert_pem: String,
    /// Server private key (PEM format)
    pub key_pem: String,
    /// Client CA certificate; when present peers may authenticate with certificates
    pub client_ca_cert: Option<String>,
}

impl GrpcServerTlsConfig {
    /// Load server TLS config from environment variables
    ///
    /// **Environment Variables**:
    /// - `GRPC_SERVER_CERT_PATH`: Path to server certificate PEM file
    /// - `GRPC_SERVER_KEY_PATH`: Path to server private key PEM file
    /// - `GRPC_CLIENT_CA_CERT_PATH`: Path to client CA cert for mTLS (optional)
    pub fn from_env() -> TlsResult<Self> {
        let cert_path = required_env(
            "GRPC_SERVER_CERT_PATH",
            "Set to the server certificate path",
        )?;
        let key_path = required_env("GRPC_SERVER_KEY_PATH", "Set to the server private key path")?;

        let cert_pem = read_pem(&cert_path)?;
        let key_pem = read_pem(&key_path)?;

        let client_ca_cert = match std::env::var("GRPC_CLIENT_CA_CERT_PATH") {
            Ok(path) => Some(read_pem(&path)?),
            Err(_) => None,
        };

        info!(
            cert_path = %cert_path,
            mtls_enabled = client_ca_cert.is_some(),
            "gRPC server TLS configuration loaded"
        );

        Ok(Self {
            cert_pem,
            key_pem,
            client_ca_cert,
        })
    }

    /// Create development config with self-signed certificates
    ///
    /// **WARNING**: Only use in development/testing, NEVER in production
    pub fn development() -> TlsResult<(Self, CertificateBundle)> {
        warn!("Using development TLS config with self-signed certificates - NOT for production");

        let bundle = generate_dev_certificates()?;
        let config = Self {
            cert_pem: bundle.server_cert.clone(),
            key_pem: bundle.server_key.clone(),
            client_ca_cert: Some(bundle.ca_cert.clone()),
        };

        Ok((config, bundle))
    }

    /// Build tonic ServerTlsConfig
    ///
    /// Client certificates stay optional so callers without one can still
    /// authenticate with a bearer token.
    pub fn build_server_tls(&self) -> ServerTlsConfig {
        let identity = Identity::from_pem(&self.cert_pem, &self.key_pem);
        let mut tls_config = ServerTlsConfig::new().identity(identity);

        if let Some(ref ca_cert) = self.client_ca_cert {
            tls_config = tls_config
                .client_ca_root(Certificate::from_pem(ca_cert))
                .client_auth_optional(true);
            info!("mTLS enabled with optional client certificates");
        }

        tls_config
    }
}

fn required_env(var_name: &str, hint: &str) -> TlsResult<String> {
    std::env::var(var_name).map_err(|_| TlsError::MissingEnvVar {
        var_name: var_name.to_string(),
        hint: hint.to_string(),
    })
}

fn read_pem(path: &str) -> TlsResult<String> {
    fs::read_to_string(path).map_err(|source| TlsError::CertificateReadError {
        path: path.into(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_server_config() {
        let (config, bundle) = GrpcServerTlsConfig::development().unwrap();
        assert_eq!(config.cert_pem, bundle.server_cert);
        assert_eq!(config.client_ca_cert.as_deref(), Some(bundle.ca_cert.as_str()));
    }
}
