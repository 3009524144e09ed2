//! Request extension trait for reading the authenticated identity
//!
//! The interceptors store an [`AuthBindings`] value in the request extensions
//! once a call is authenticated. Handlers read it back through
//! [`AuthContextExt`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rpc_auth::AuthContextExt;
//! use tonic::{Request, Response, Status};
//!
//! async fn whoami(request: Request<()>) -> Result<Response<String>, Status> {
//!     let entity = request.auth_entity()?;
//!     let name = entity.name().unwrap_or("<opaque>").to_string();
//!     Ok(Response::new(name))
//! }
//! ```

use crate::claims::Claims;
use crate::credentials::{AuthEntity, AuthMetadata};
use std::sync::Arc;
use tonic::{Request, Status};

/// Identity bound to a call after successful authentication
///
/// Calls authenticated by certificate carry no claims and no metadata.
#[derive(Debug, Clone)]
pub struct AuthBindings {
    pub entity: AuthEntity,
    pub claims: Option<Arc<dyn Claims>>,
    pub auth_metadata: Option<AuthMetadata>,
}

impl AuthBindings {
    /// Bindings for a verified token
    pub fn from_claims(entity: AuthEntity, claims: Arc<dyn Claims>) -> Self {
        let auth_metadata = claims
            .auth_metadata()
            .filter(|md| !md.is_empty())
            .cloned();
        Self {
            entity,
            claims: Some(claims),
            auth_metadata,
        }
    }

    /// Bindings for a peer identified by its certificate
    pub fn from_tls(entity: AuthEntity) -> Self {
        Self {
            entity,
            claims: None,
            auth_metadata: None,
        }
    }
}

/// Extension trait for accessing auth bindings from gRPC requests
pub trait AuthContextExt {
    /// All bindings; unauthenticated if the call was not authenticated
    fn auth_bindings(&self) -> Result<&AuthBindings, Status>;

    fn auth_entity(&self) -> Result<&AuthEntity, Status> {
        self.auth_bindings().map(|bindings| &bindings.entity)
    }

    /// Verified claims, if the call was authenticated by token
    fn auth_claims(&self) -> Option<&Arc<dyn Claims>> {
        self.auth_bindings().ok()?.claims.as_ref()
    }

    fn auth_metadata(&self) -> Option<&AuthMetadata> {
        self.auth_bindings().ok()?.auth_metadata.as_ref()
    }
}

impl<T> AuthContextExt for Request<T> {
    fn auth_bindings(&self) -> Result<&AuthBindings, Status> {
        self.extensions()
            .get::<AuthBindings>()
            .ok_or_else(|| Status::unauthenticated("authentication required"))
    }
}
