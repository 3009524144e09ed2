//! Client-side bearer token injection
//!
//! Attaches a token obtained from `Authenticate` to every outgoing call.

use crate::server::{AUTHORIZATION_HEADER, BEARER_PREFIX};
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Interceptor adding `authorization: Bearer <token>` to outgoing requests
///
/// ## Usage
///
/// ```rust,no_run
/// use rpc_auth::proto::auth_service_client::AuthServiceClient;
/// use rpc_auth::BearerTokenInterceptor;
/// use tonic::transport::Channel;
///
/// # async fn example(access_token: String) -> Result<(), Box<dyn std::error::Error>> {
/// let channel = Channel::from_static("http://[::1]:50051").connect().await?;
/// let interceptor = BearerTokenInterceptor::try_new(access_token)?;
/// let _client = AuthServiceClient::with_interceptor(channel, interceptor);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BearerTokenInterceptor {
    /// Pre-formatted "Bearer {token}"
    auth_header: AsciiMetadataValue,
}

impl BearerTokenInterceptor {
    /// Fails if the token is not valid ASCII metadata
    pub fn try_new(token: impl AsRef<str>) -> Result<Self, Status> {
        let value = format!("{BEARER_PREFIX}{}", token.as_ref());
        let auth_header = AsciiMetadataValue::try_from(value)
            .map_err(|_| Status::invalid_argument("access token is not valid ASCII metadata"))?;

        Ok(Self { auth_header })
    }
}

impl Interceptor for BearerTokenInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, self.auth_header.clone());
        Ok(request)
    }
}
