//! The auth server: handler registry, signing key and the authentication funnel
//!
//! [`AuthServer::ensure_authed`] decides whether a call is authenticated. It
//! always tries the bearer token first and consults the peer certificate only
//! when no usable `authorization` header is present.

use crate::claims::{ClaimsDecoder, RpcClaims};
use crate::config::AuthSettings;
use crate::credentials::{AuthHandler, AuthHandlers, AuthMetadata, CredentialsType};
use crate::error::{AuthError, Result};
use crate::extensions::AuthBindings;
use crate::service::{AuthenticateToHandler, DelegateFromCredentialsTypes};
use crate::tls::{TlsAuthError, TlsAuthHandler};
use crate::token::{
    credentials_type_from_claims, is_self_signing_algorithm, peek_unverified, verify_signature,
    SigningKeys, DEFAULT_KEY_BITS,
};
use rsa::RsaPrivateKey;
use rustls::pki_types::CertificateDer;
use std::collections::HashSet;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tracing::{debug, error, info, warn};

/// Metadata key carrying the bearer token
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Required prefix of the `authorization` value
pub const BEARER_PREFIX: &str = "Bearer ";

/// Full method name of `Authenticate`
pub const AUTHENTICATE_METHOD: &str = "/proto.rpc.v1.AuthService/Authenticate";

/// Full method name of `AuthenticateTo`
pub const AUTHENTICATE_TO_METHOD: &str = "/proto.rpc.v1.AuthService/AuthenticateTo";

/// Methods that never require authentication
pub const DEFAULT_EXEMPT_METHODS: &[&str] = &[
    AUTHENTICATE_METHOD,
    "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
    "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
    "/grpc.health.v1.Health/Check",
    "/grpc.health.v1.Health/Watch",
];

pub(crate) struct AuthTo {
    pub(crate) credentials_type: CredentialsType,
    pub(crate) handler: Arc<dyn AuthenticateToHandler>,
}

/// Authentication state shared by every call
///
/// Read-only after [`AuthServerBuilder::build`]; share it behind an `Arc`.
pub struct AuthServer {
    handlers: AuthHandlers,
    signing_keys: SigningKeys,
    exempt_methods: HashSet<String>,
    pub(crate) auth_to: Option<AuthTo>,
    tls_auth_handler: Option<Arc<dyn TlsAuthHandler>>,
}

impl AuthServer {
    pub fn builder() -> AuthServerBuilder {
        AuthServerBuilder::default()
    }

    pub fn handlers(&self) -> &AuthHandlers {
        &self.handlers
    }

    /// Whether `method` (`/package.Service/Method`) bypasses authentication
    pub fn is_exempt(&self, method: &str) -> bool {
        self.exempt_methods.contains(method)
    }

    /// Authenticate a call from its metadata and the peer's verified certificates
    ///
    /// `peer_certs` is the chain the TLS layer verified, leaf first.
    pub async fn ensure_authed(
        &self,
        metadata: &MetadataMap,
        peer_certs: Option<&[CertificateDer<'_>]>,
    ) -> std::result::Result<AuthBindings, Status> {
        let token = match token_from_metadata(metadata) {
            Ok(token) => token,
            Err(bearer_err) => return self.authenticate_peer(bearer_err, peer_certs).await,
        };

        self.verify_token(token).await
    }

    /// Verify a bearer token and resolve the entity it names
    pub async fn verify_token(&self, token: &str) -> std::result::Result<AuthBindings, Status> {
        let (header, unverified) = peek_unverified(token)?;
        let credentials_type = credentials_type_from_claims(&unverified).map_err(unauthenticated)?;
        let handler = self
            .handlers
            .lookup(&credentials_type)
            .map_err(unauthenticated)?;

        let payload = match handler.token_verification_key_provider() {
            Some(provider) => {
                let key = provider
                    .token_verification_key(&header, &unverified)
                    .await
                    .map_err(unauthenticated)?;
                verify_signature(token, &key.key, key.algorithms)?
            }
            None => {
                if !is_self_signing_algorithm(header.alg) {
                    return Err(Status::unauthenticated(format!(
                        "unauthenticated: unexpected signing method {:?}",
                        header.alg
                    )));
                }
                verify_signature(token, self.signing_keys.decoding_key(), vec![header.alg])?
            }
        };

        let decoder = claims_decoder(&**handler)?;
        let claims = decoder
            .decode(payload)
            .map_err(|e| Status::invalid_argument(format!("error decoding claims: {e}")))?;

        claims
            .validate()
            .map_err(|e| Status::unauthenticated(format!("unauthenticated: {e}")))?;

        let entity = claims.entity()?;
        let auth_entity = handler.verify_entity(claims.as_ref(), &entity).await?;

        debug!(
            entity = %entity,
            credentials_type = %credentials_type,
            "Bearer token verified"
        );

        Ok(AuthBindings::from_claims(auth_entity, claims))
    }

    /// Sign a token scoped to `entity`
    ///
    /// The signing failure itself is only logged.
    pub fn sign_access_token_for_entity(
        &self,
        for_type: &CredentialsType,
        entity: &str,
        auth_metadata: AuthMetadata,
    ) -> std::result::Result<String, Status> {
        let claims = RpcClaims::for_entity(entity, for_type.clone(), auth_metadata);
        self.signing_keys.sign(&claims).map_err(|e| {
            error!(error = %e, "Failed to sign access token");
            Status::permission_denied("failed to authenticate")
        })
    }

    async fn authenticate_peer(
        &self,
        bearer_err: Status,
        peer_certs: Option<&[CertificateDer<'_>]>,
    ) -> std::result::Result<AuthBindings, Status> {
        let Some(tls_handler) = self.tls_auth_handler.as_ref() else {
            return Err(bearer_err);
        };
        let Some(leaf) = peer_certs.and_then(|certs| certs.first()) else {
            return Err(bearer_err);
        };

        let dns_names = match grpc_tls::dns_names(leaf) {
            Ok(names) => names,
            Err(e) => return Err(combine(&bearer_err, &e)),
        };

        match tls_handler.entity_from_dns_names(&dns_names).await {
            Ok(entity) => {
                debug!(dns_names = ?dns_names, "Peer authenticated by certificate");
                Ok(AuthBindings::from_tls(entity))
            }
            Err(TlsAuthError::NotTlsAuthed) => {
                debug!(dns_names = ?dns_names, "Peer certificate not recognized");
                Err(bearer_err)
            }
            Err(e) => {
                warn!(error = %e, dns_names = ?dns_names, "Peer certificate rejected");
                Err(combine(&bearer_err, &e))
            }
        }
    }
}

/// Extract the bearer token; exactly one `authorization` value is accepted
pub fn token_from_metadata(metadata: &MetadataMap) -> std::result::Result<&str, Status> {
    let mut values = metadata.get_all(AUTHORIZATION_HEADER).iter();
    let (Some(value), None) = (values.next(), values.next()) else {
        return Err(Status::unauthenticated("authentication required"));
    };

    value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| Status::unauthenticated(format!("expected Authorization: {BEARER_PREFIX}")))
}

fn claims_decoder(handler: &dyn AuthHandler) -> std::result::Result<ClaimsDecoder, Status> {
    match handler.custom_claims_provider() {
        None => Ok(ClaimsDecoder::default()),
        Some(provider) => provider.create_claims().ok_or_else(|| {
            Status::internal("invalid implementation of TokenCustomClaimProvider, cannot return nil")
        }),
    }
}

fn unauthenticated(status: Status) -> Status {
    Status::unauthenticated(format!("unauthenticated: {}", status.message()))
}

fn combine(bearer_err: &Status, tls_err: &dyn std::fmt::Display) -> Status {
    Status::new(
        bearer_err.code(),
        format!("{}; {}", bearer_err.message(), tls_err),
    )
}

enum SigningKeySource {
    Pem(String),
    Rsa(RsaPrivateKey),
}

/// Builder for [`AuthServer`]
pub struct AuthServerBuilder {
    handlers: Vec<(CredentialsType, Arc<dyn AuthHandler>)>,
    signing_key: Option<SigningKeySource>,
    key_bits: usize,
    auth_to: Option<AuthTo>,
    tls_auth_handler: Option<Arc<dyn TlsAuthHandler>>,
    exempt_methods: Vec<String>,
}

impl Default for AuthServerBuilder {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            signing_key: None,
            key_bits: DEFAULT_KEY_BITS,
            auth_to: None,
            tls_auth_handler: None,
            exempt_methods: Vec::new(),
        }
    }
}

impl AuthServerBuilder {
    /// Register the handler for a credential type
    pub fn auth_handler(
        mut self,
        for_type: impl Into<CredentialsType>,
        handler: impl AuthHandler + 'static,
    ) -> Self {
        self.handlers.push((for_type.into(), Arc::new(handler)));
        self
    }

    /// Sign with a PEM-encoded RSA private key
    pub fn private_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.signing_key = Some(SigningKeySource::Pem(pem.into()));
        self
    }

    pub fn rsa_private_key(mut self, key: RsaPrivateKey) -> Self {
        self.signing_key = Some(SigningKeySource::Rsa(key));
        self
    }

    /// Size of the key generated when none is configured
    pub fn key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Enable `AuthenticateTo`, tagging issued tokens with `for_type`
    ///
    /// `for_type` must have a registered auth handler.
    pub fn authenticate_to(
        mut self,
        for_type: impl Into<CredentialsType>,
        handler: impl AuthenticateToHandler + 'static,
    ) -> Self {
        self.auth_to = Some(AuthTo {
            credentials_type: for_type.into(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Fall back to peer certificates when no bearer token is sent
    pub fn tls_auth_handler(mut self, handler: impl TlsAuthHandler + 'static) -> Self {
        self.tls_auth_handler = Some(Arc::new(handler));
        self
    }

    pub fn exempt_method(mut self, method: impl Into<String>) -> Self {
        self.exempt_methods.push(method.into());
        self
    }

    /// Apply settings loaded with [`AuthSettings::from_env`]
    ///
    /// A configured delegation type lets callers authenticated with that
    /// type call `AuthenticateTo`.
    pub fn from_settings(mut self, settings: &AuthSettings) -> Self {
        if let Some(pem) = &settings.private_key_pem {
            self = self.private_key_pem(pem.clone());
        }
        if settings.key_bits > 0 {
            self.key_bits = settings.key_bits;
        }
        self.exempt_methods
            .extend(settings.exempt_methods.iter().cloned());
        if let Some(for_type) = &settings.auth_to_credentials_type {
            self = self.authenticate_to(
                for_type.clone(),
                DelegateFromCredentialsTypes::new([for_type.clone()]),
            );
        }
        self
    }

    pub fn build(self) -> Result<AuthServer> {
        let mut handlers = AuthHandlers::new();
        for (for_type, handler) in self.handlers {
            handlers.register(for_type, handler)?;
        }

        if let Some(auth_to) = &self.auth_to {
            if !handlers.contains(&auth_to.credentials_type) {
                return Err(AuthError::config(format!(
                    "no auth handler registered for authenticate-to type {:?}",
                    auth_to.credentials_type.as_str()
                )));
            }
        }

        let signing_keys = match self.signing_key {
            Some(SigningKeySource::Pem(pem)) => SigningKeys::from_pem(&pem)?,
            Some(SigningKeySource::Rsa(key)) => SigningKeys::from_rsa_key(&key)?,
            None => {
                warn!(
                    bits = self.key_bits,
                    "No signing key configured, generating an ephemeral key; tokens will not survive a restart"
                );
                SigningKeys::generate(self.key_bits)?
            }
        };

        let exempt_methods: HashSet<String> = DEFAULT_EXEMPT_METHODS
            .iter()
            .map(|method| method.to_string())
            .chain(self.exempt_methods)
            .collect();

        info!(
            handlers = handlers.len(),
            exempt_methods = exempt_methods.len(),
            authenticate_to = self.auth_to.is_some(),
            tls_fallback = self.tls_auth_handler.is_some(),
            "Auth server configured"
        );

        Ok(AuthServer {
            handlers,
            signing_keys,
            exempt_methods,
            auth_to: self.auth_to,
            tls_auth_handler: self.tls_auth_handler,
        })
    }
}
