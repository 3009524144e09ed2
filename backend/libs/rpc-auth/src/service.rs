//! `proto.rpc.v1.AuthService`: the `Authenticate` and `AuthenticateTo` handlers
//!
//! `Authenticate` is exempt from authentication and trades raw credentials for
//! a token. `AuthenticateTo` runs behind the auth layer and lets a trusted
//! caller obtain a token for another entity.

use crate::credentials::{AuthMetadata, CredentialsType};
use crate::error::{AuthError, Result};
use crate::extensions::{AuthBindings, AuthContextExt};
use crate::proto::auth_service_server::{AuthService, AuthServiceServer};
use crate::proto::{
    AuthenticateRequest, AuthenticateResponse, AuthenticateToRequest, AuthenticateToResponse,
};
use crate::server::{AuthServer, AUTHORIZATION_HEADER};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

/// Decides whether an authenticated caller may obtain a token for another entity
#[async_trait]
pub trait AuthenticateToHandler: Send + Sync {
    /// Returns the metadata to embed in the delegated token
    async fn authenticate_to(&self, caller: &AuthBindings, entity: &str) -> Result<AuthMetadata>;
}

/// Allows delegation to callers whose token carries one of a set of credential types
///
/// Callers authenticated only by certificate carry no claims and are refused.
#[derive(Debug, Clone)]
pub struct DelegateFromCredentialsTypes {
    allowed: HashSet<CredentialsType>,
}

impl DelegateFromCredentialsTypes {
    pub fn new(allowed: impl IntoIterator<Item = CredentialsType>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AuthenticateToHandler for DelegateFromCredentialsTypes {
    async fn authenticate_to(&self, caller: &AuthBindings, _entity: &str) -> Result<AuthMetadata> {
        let claims = caller.claims.as_ref().ok_or_else(|| {
            AuthError::Rpc(Status::permission_denied(
                "authenticate-to requires a token-authenticated caller",
            ))
        })?;

        let credentials_type = claims.credentials_type();
        if !self.allowed.contains(&credentials_type) {
            return Err(AuthError::Rpc(Status::permission_denied(format!(
                "credentials type {:?} cannot authenticate to other entities",
                credentials_type.as_str()
            ))));
        }

        Ok(AuthMetadata::new())
    }
}

/// AuthService gRPC server implementation
#[derive(Clone)]
pub struct AuthServiceImpl {
    server: Arc<AuthServer>,
}

impl AuthServiceImpl {
    pub fn new(server: Arc<AuthServer>) -> Self {
        Self { server }
    }

    pub fn into_service(self) -> AuthServiceServer<Self> {
        AuthServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn authenticate(
        &self,
        request: Request<AuthenticateRequest>,
    ) -> std::result::Result<Response<AuthenticateResponse>, Status> {
        if request.metadata().get(AUTHORIZATION_HEADER).is_some() {
            return Err(Status::invalid_argument(
                "already authenticated; cannot re-authenticate",
            ));
        }

        let req = request.into_inner();
        let credentials = req
            .credentials
            .ok_or_else(|| Status::invalid_argument("credentials required"))?;
        let for_type = CredentialsType::new(credentials.r#type);
        let handler = self.server.handlers().lookup(&for_type)?;

        let auth_metadata = handler
            .authenticate(&req.entity, &credentials.payload)
            .await
            .map_err(|e| {
                warn!(entity = %req.entity, credentials_type = %for_type, error = %e, "Authentication rejected");
                e.into_permission_status()
            })?;

        let access_token =
            self.server
                .sign_access_token_for_entity(&for_type, &req.entity, auth_metadata)?;

        info!(entity = %req.entity, credentials_type = %for_type, "Access token issued");

        Ok(Response::new(AuthenticateResponse { access_token }))
    }

    async fn authenticate_to(
        &self,
        request: Request<AuthenticateToRequest>,
    ) -> std::result::Result<Response<AuthenticateToResponse>, Status> {
        let Some(auth_to) = self.server.auth_to.as_ref() else {
            return Err(Status::unimplemented("authenticate-to is not configured"));
        };

        let caller = request.auth_bindings()?;
        let entity = request.get_ref().entity.as_str();

        let auth_metadata = auth_to
            .handler
            .authenticate_to(caller, entity)
            .await
            .map_err(|e| {
                warn!(entity = %entity, error = %e, "Authenticate-to rejected");
                e.into_permission_status()
            })?;

        let access_token = self.server.sign_access_token_for_entity(
            &auth_to.credentials_type,
            entity,
            auth_metadata,
        )?;

        info!(
            entity = %entity,
            credentials_type = %auth_to.credentials_type,
            "Delegated access token issued"
        );

        Ok(Response::new(AuthenticateToResponse { access_token }))
    }
}
