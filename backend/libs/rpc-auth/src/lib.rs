//! Authentication core for gRPC services
//!
//! Decides for every incoming call whether the caller is who they claim to
//! be, binds the verified identity to the call, and issues the bearer tokens
//! callers present on later calls.
//!
//! ## Core Components
//!
//! - **AuthHandlers**: registry of credential schemes keyed by [`CredentialsType`]
//! - **RpcClaims / Claims**: token payload contract, with custom claims shapes
//! - **AuthServer**: token issuance, two-pass token verification, TLS fallback
//! - **AuthServiceImpl**: the `Authenticate` and `AuthenticateTo` RPCs
//! - **AuthLayer** and the `intercept_*` methods: gate every non-exempt call
//! - **AuthContextExt**: read the bound identity from a request
//! - **BearerTokenInterceptor**: attach a token to outgoing calls
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rpc_auth::{ApiKeyAuthHandler, AuthLayer, AuthServer, AuthServiceImpl, CredentialsType};
//! use std::sync::Arc;
//! use tonic::transport::Server;
//!
//! # async fn example(signing_key_pem: String) -> Result<(), Box<dyn std::error::Error>> {
//! let auth = Arc::new(
//!     AuthServer::builder()
//!         .private_key_pem(signing_key_pem)
//!         .auth_handler(
//!             CredentialsType::API_KEY,
//!             ApiKeyAuthHandler::new(["robot-42"], "secret123"),
//!         )
//!         .build()?,
//! );
//!
//! Server::builder()
//!     .layer(AuthLayer::new(auth.clone()))
//!     .add_service(AuthServiceImpl::new(auth).into_service())
//!     .serve("0.0.0.0:8080".parse()?)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Precedence
//!
//! A bearer token is always tried first. The peer certificate is consulted
//! only when no well-formed `authorization` header is present, never to
//! override a token that fails verification.

pub mod claims;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod extensions;
pub mod interceptor;
pub mod proto;
pub mod schemes;
pub mod server;
pub mod service;
pub mod tls;
pub mod token;

pub use claims::{downcast_claims, Claims, ClaimsDecoder, ClaimsError, RegisteredClaims, RpcClaims};
pub use client::BearerTokenInterceptor;
pub use config::AuthSettings;
pub use credentials::{
    AuthEntity, AuthHandler, AuthHandlers, AuthMetadata, CredentialsType, TokenCustomClaimProvider,
    TokenVerificationKey, TokenVerificationKeyProvider,
};
pub use error::{AuthError, Result};
pub use extensions::{AuthBindings, AuthContextExt};
pub use interceptor::{AuthLayer, AuthMiddleware, AuthedStream};
pub use server::{
    token_from_metadata, AuthServer, AuthServerBuilder, AUTHENTICATE_METHOD,
    AUTHENTICATE_TO_METHOD, DEFAULT_EXEMPT_METHODS,
};
pub use schemes::{ApiKeyAuthHandler, ExternalTokenHandler};
pub use service::{AuthServiceImpl, AuthenticateToHandler, DelegateFromCredentialsTypes};
pub use tls::{AllowedDnsNames, TlsAuthError, TlsAuthHandler};
pub use token::SigningKeys;
