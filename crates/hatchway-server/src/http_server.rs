//! HTTP Front
//!
//! This module provides the HTTP server in front of the render pipeline,
//! using hyper for HTTP/1.1 with one spawned task per connection.
//!
//! # Request handling order
//!
//! 1. Paths under the API prefix are proxied verbatim to the backend
//! 2. GET/HEAD requests matching a file under the public dir are served
//!    statically
//! 3. Everything else goes through the render pipeline and comes back as
//!    a streamed HTML document or a redirect
//!
//! TLS termination is optional: when the config names certificate and key
//! files, every accepted connection goes through the rustls acceptor
//! first.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Bytes, Frame, Incoming};
use hyper::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use hatchway_common::error::{HatchwayError, Result};

use crate::config::ServerConfig;
use crate::pipeline::{PageRequest, PipelineResponse, RenderPipeline};
use crate::proxy;
use crate::tls;

/// Response body type used across the front: static files, proxy
/// passthrough and SSR streams all box down to this.
pub type SsrBody = UnsyncBoxBody<Bytes, std::io::Error>;

pub(crate) fn full_body(content: impl Into<Bytes>) -> SsrBody {
    Full::new(content.into())
        .map_err(std::io::Error::other)
        .boxed_unsync()
}

fn stream_body(rx: mpsc::Receiver<Bytes>) -> SsrBody {
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, std::io::Error>(Frame::data(chunk)), rx))
    });
    StreamBody::new(stream).boxed_unsync()
}

pub struct HttpServer {
    pipeline: Arc<RenderPipeline>,
    config: ServerConfig,
    static_files: Option<ServeDir>,
    proxy_client: proxy::ProxyClient,
    tls_acceptor: Option<TlsAcceptor>,
}

impl HttpServer {
    /// Builds the front from its configuration.
    ///
    /// # Errors
    ///
    /// Fails when TLS is configured but the certificate or key cannot be
    /// loaded; this is a startup error, reported before binding.
    pub fn new(pipeline: Arc<RenderPipeline>, config: ServerConfig) -> Result<Self> {
        let static_files = config.public_dir.as_ref().map(ServeDir::new);
        let tls_acceptor = config.tls.as_ref().map(tls::load_acceptor).transpose()?;
        Ok(Self {
            pipeline,
            config,
            static_files,
            proxy_client: proxy::build_client(),
            tls_acceptor,
        })
    }

    /// Binds the listener and serves until shutdown.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HatchwayError::Transport(format!("Failed to bind to {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HatchwayError::Transport(format!("Failed to get local address: {e}")))?;
        tracing::info!(
            scheme = if self.tls_acceptor.is_some() { "https" } else { "http" },
            "listening on {local_addr}"
        );
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let server = Arc::new(self);
        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| HatchwayError::Transport(format!("Failed to accept: {e}")))?;

            let server = Arc::clone(&server);
            tokio::task::spawn(async move {
                match server.tls_acceptor.clone() {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => serve_connection(server, tls_stream).await,
                        Err(error) => tracing::debug!(%error, "TLS handshake failed"),
                    },
                    None => serve_connection(server, stream).await,
                }
            });
        }
    }

    async fn handle_request(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<SsrBody>, Infallible> {
        let path = req.uri().path().to_string();

        if path.starts_with(&self.config.api_prefix) {
            return Ok(proxy::forward(
                &self.proxy_client,
                &self.config.backend_url,
                &self.config.api_prefix,
                req,
            )
            .await);
        }

        if req.method() == Method::GET || req.method() == Method::HEAD {
            if let Some(response) = self.try_static(&req).await {
                return Ok(response);
            }
        }

        let page_request = PageRequest {
            method: req.method().to_string(),
            path: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or(path),
            cookies: req
                .headers()
                .get(COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string(),
        };

        let response = match self.pipeline.handle(page_request).await {
            PipelineResponse::Redirect { location, cookies } => {
                let mut builder = Response::builder()
                    .status(StatusCode::SEE_OTHER)
                    .header(LOCATION, location);
                for cookie in cookies {
                    builder = builder.header(SET_COOKIE, cookie);
                }
                builder.body(full_body(""))
            }
            PipelineResponse::Stream { body, cookies } => {
                let mut builder = Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "text/html; charset=utf-8");
                for cookie in cookies {
                    builder = builder.header(SET_COOKIE, cookie);
                }
                builder.body(stream_body(body))
            }
            PipelineResponse::Failure { status, message } => Response::builder()
                .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(full_body(message)),
        };

        Ok(response.unwrap_or_else(|error| {
            tracing::error!(%error, "failed to build response");
            minimal_failure()
        }))
    }

    /// Serves an existing file under the public dir, if any.
    async fn try_static(&self, req: &Request<Incoming>) -> Option<Response<SsrBody>> {
        let static_files = self.static_files.clone()?;
        let static_request = Request::builder()
            .method(req.method().clone())
            .uri(req.uri().clone())
            .body(Empty::<Bytes>::new())
            .ok()?;

        match static_files.oneshot(static_request).await {
            Ok(response) if response.status() != StatusCode::NOT_FOUND => {
                Some(response.map(|body| body.map_err(std::io::Error::other).boxed_unsync()))
            }
            _ => None,
        }
    }
}

async fn serve_connection<I>(server: Arc<HttpServer>, io: I)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let server = Arc::clone(&server);
        async move { server.handle_request(req).await }
    });

    if let Err(error) = http1::Builder::new()
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        // Client disconnects mid-stream land here; the pipeline's stream
        // pump releases its scope on the broken send, nothing is retried.
        tracing::debug!(%error, "connection closed with error");
    }
}

fn minimal_failure() -> Response<SsrBody> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(full_body("internal error"))
        .unwrap()
}
