//! Server-side interceptors gating every non-exempt call
//!
//! Three entry points share [`AuthServer::ensure_authed`]:
//! - [`AuthServer::intercept_unary`] for a single request message
//! - [`AuthServer::intercept_streaming`] which wraps the inbound stream so its
//!   [`AuthedStream::context`] exposes the bindings
//! - [`AuthLayer`], a tower layer for `tonic::transport::Server::builder().layer(..)`
//!
//! On success the [`AuthBindings`] are inserted into the request extensions,
//! where [`crate::AuthContextExt`] reads them. Exempt methods pass through
//! untouched.

use crate::extensions::AuthBindings;
use crate::server::AuthServer;
use futures::future::BoxFuture;
use futures::Stream;
use pin_project::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::metadata::MetadataMap;
use tonic::transport::server::{TcpConnectInfo, TlsConnectInfo};
use tonic::{Request, Status};
use tower::{Layer, Service};
use tracing::warn;

impl AuthServer {
    /// Authenticate a unary call unless `method` is exempt
    pub async fn intercept_unary<T>(
        &self,
        method: &str,
        mut request: Request<T>,
    ) -> Result<Request<T>, Status> {
        if self.is_exempt(method) {
            return Ok(request);
        }

        let peer_certs = request.peer_certs();
        let bindings = self
            .ensure_authed(request.metadata(), peer_certs.as_deref().map(Vec::as_slice))
            .await
            .map_err(|status| reject(method, status))?;

        request.extensions_mut().insert(bindings);
        Ok(request)
    }

    /// Authenticate a streaming call unless `method` is exempt
    ///
    /// The returned stream carries the bindings for the life of the call.
    pub async fn intercept_streaming<S>(
        &self,
        method: &str,
        request: Request<S>,
    ) -> Result<Request<AuthedStream<S>>, Status> {
        if self.is_exempt(method) {
            return Ok(request.map(|stream| AuthedStream::new(stream, None)));
        }

        let peer_certs = request.peer_certs();
        let bindings = self
            .ensure_authed(request.metadata(), peer_certs.as_deref().map(Vec::as_slice))
            .await
            .map_err(|status| reject(method, status))?;

        let mut request = request.map(|stream| AuthedStream::new(stream, Some(bindings.clone())));
        request.extensions_mut().insert(bindings);
        Ok(request)
    }
}

fn reject(method: &str, status: Status) -> Status {
    warn!(
        method = %method,
        code = ?status.code(),
        reason = %status.message(),
        "Rejected unauthenticated call"
    );
    status
}

/// Inbound stream of an authenticated call
#[pin_project]
pub struct AuthedStream<S> {
    #[pin]
    inner: S,
    bindings: Option<AuthBindings>,
}

impl<S> AuthedStream<S> {
    pub fn new(inner: S, bindings: Option<AuthBindings>) -> Self {
        Self { inner, bindings }
    }

    /// Bindings of the call; `None` for exempt methods
    pub fn context(&self) -> Option<&AuthBindings> {
        self.bindings.as_ref()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Stream> Stream for AuthedStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Tower layer authenticating every non-exempt gRPC call
#[derive(Clone)]
pub struct AuthLayer {
    server: Arc<AuthServer>,
}

impl AuthLayer {
    pub fn new(server: Arc<AuthServer>) -> Self {
        Self { server }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, service: S) -> Self::Service {
        AuthMiddleware {
            inner: service,
            server: self.server.clone(),
        }
    }
}

/// Tower service produced by [`AuthLayer`]
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    server: Arc<AuthServer>,
}

impl<S, B> Service<http::Request<B>> for AuthMiddleware<S>
where
    S: Service<http::Request<B>, Response = http::Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let server = self.server.clone();
        // The clone may not be ready; keep the one poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let method = req.uri().path().to_string();
            if server.is_exempt(&method) {
                return inner.call(req).await;
            }

            let metadata = MetadataMap::from_headers(req.headers().clone());
            let peer_certs = req
                .extensions()
                .get::<TlsConnectInfo<TcpConnectInfo>>()
                .and_then(|info| info.peer_certs());

            match server
                .ensure_authed(&metadata, peer_certs.as_deref().map(Vec::as_slice))
                .await
            {
                Ok(bindings) => {
                    req.extensions_mut().insert(bindings);
                    inner.call(req).await
                }
                Err(status) => Ok(reject(&method, status).into_http()),
            }
        })
    }
}
