//! Auth server settings loaded from the environment
//!
//! # Example
//!
//! ```no_run
//! use rpc_auth::{AuthServer, AuthSettings};
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = AuthSettings::from_env()?;
//!     let _server = AuthServer::builder().from_settings(&settings).build()?;
//!     Ok(())
//! }
//! ```

use crate::credentials::CredentialsType;
use crate::token::DEFAULT_KEY_BITS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

/// Settings for building an [`crate::AuthServer`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// PEM signing key; a key is generated when absent
    pub private_key_pem: Option<String>,
    /// Size of a generated signing key
    pub key_bits: usize,
    /// Methods exempt in addition to the defaults
    pub exempt_methods: Vec<String>,
    /// Credential type tagged on tokens issued by `AuthenticateTo`
    pub auth_to_credentials_type: Option<CredentialsType>,
}

impl AuthSettings {
    /// Load settings from environment variables
    ///
    /// **Environment Variables**:
    /// - `RPC_AUTH_PRIVATE_KEY_PATH`: PEM file with the RSA signing key (optional)
    /// - `RPC_AUTH_KEY_BITS`: generated key size (default 2048)
    /// - `RPC_AUTH_EXEMPT_METHODS`: comma-separated `/package.Service/Method` names
    /// - `RPC_AUTH_TO_CREDENTIALS_TYPE`: delegation credential type (optional)
    pub fn from_env() -> Result<Self> {
        let private_key_pem = match env::var("RPC_AUTH_PRIVATE_KEY_PATH") {
            Ok(path) => Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read signing key from {path}"))?,
            ),
            Err(_) => None,
        };

        let key_bits = env::var("RPC_AUTH_KEY_BITS")
            .unwrap_or_else(|_| DEFAULT_KEY_BITS.to_string())
            .parse()
            .context("Invalid RPC_AUTH_KEY_BITS")?;

        let exempt_methods = env::var("RPC_AUTH_EXEMPT_METHODS")
            .map(|value| parse_method_list(&value))
            .unwrap_or_default();

        let auth_to_credentials_type = env::var("RPC_AUTH_TO_CREDENTIALS_TYPE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| CredentialsType::new(value.trim()));

        Ok(Self {
            private_key_pem,
            key_bits,
            exempt_methods,
            auth_to_credentials_type,
        })
    }
}

fn parse_method_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|method| !method.is_empty())
        .map(String::from)
        .collect()
}
