//! Identity from a verified client certificate
//!
//! When a call carries no bearer token the server may fall back to the peer
//! certificate the TLS layer verified. A [`TlsAuthHandler`] maps the DNS names
//! of that certificate to an entity, or declines.

use crate::credentials::AuthEntity;
use async_trait::async_trait;
use grpc_tls::dns_name_matches;
use thiserror::Error;
use tracing::debug;

/// Outcome of a TLS identity mapping that did not produce an entity
#[derive(Debug, Error)]
pub enum TlsAuthError {
    /// The certificate does not identify an entity; not an error for the call
    #[error("not authenticated via TLS")]
    NotTlsAuthed,

    /// The certificate was recognized but refused
    #[error("certificate rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Maps a peer certificate's DNS names to an entity
#[async_trait]
pub trait TlsAuthHandler: Send + Sync {
    /// `dns_names` are the SAN DNS entries of the leaf certificate, in order
    async fn entity_from_dns_names(&self, dns_names: &[String]) -> Result<AuthEntity, TlsAuthError>;
}

/// Accepts peers whose certificate names match one of a set of patterns
///
/// The entity is the first matching DNS name, as a `String`. Patterns are
/// exact names or names with `*` standing for a single label.
#[derive(Debug, Clone)]
pub struct AllowedDnsNames {
    patterns: Vec<String>,
}

impl AllowedDnsNames {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TlsAuthHandler for AllowedDnsNames {
    async fn entity_from_dns_names(&self, dns_names: &[String]) -> Result<AuthEntity, TlsAuthError> {
        let matched = dns_names.iter().find(|name| {
            self.patterns
                .iter()
                .any(|pattern| dns_name_matches(name, pattern))
        });

        match matched {
            Some(name) => {
                debug!(entity = %name, "Peer certificate matched allowed DNS name");
                Ok(AuthEntity::new(name.clone()))
            }
            None => Err(TlsAuthError::NotTlsAuthed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_matching_name_is_entity() {
        let handler = AllowedDnsNames::new(["*.fleet.internal"]);

        let entity = handler
            .entity_from_dns_names(&names(&["robot-42.local", "robot-42.fleet.internal"]))
            .await
            .unwrap();

        assert_eq!(entity.name(), Some("robot-42.fleet.internal"));
    }

    #[tokio::test]
    async fn test_no_match_declines() {
        let handler = AllowedDnsNames::new(["gateway.fleet.internal"]);

        let result = handler
            .entity_from_dns_names(&names(&["robot-42.fleet.internal"]))
            .await;

        assert!(matches!(result, Err(TlsAuthError::NotTlsAuthed)));
    }

    #[tokio::test]
    async fn test_empty_names_decline() {
        let handler = AllowedDnsNames::new(["*.fleet.internal"]);
        let result = handler.entity_from_dns_names(&[]).await;
        assert!(matches!(result, Err(TlsAuthError::NotTlsAuthed)));
    }
}
