//! Backend API proxy.
//!
//! Requests under the configured API prefix are forwarded verbatim to the
//! upstream backend so the browser talks to one origin only; the response
//! is streamed back unchanged. Proxy failures surface as 502 and are
//! logged, they never take the process down.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::http_server::{full_body, SsrBody};

pub(crate) type ProxyClient = Client<HttpConnector, Incoming>;

pub(crate) fn build_client() -> ProxyClient {
    Client::builder(TokioExecutor::new()).build_http()
}

pub(crate) async fn forward(
    client: &ProxyClient,
    backend_url: &str,
    api_prefix: &str,
    req: Request<Incoming>,
) -> Response<SsrBody> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let suffix = path_and_query
        .strip_prefix(api_prefix)
        .unwrap_or(path_and_query.as_str());
    let target = format!("{backend_url}{suffix}");

    let (mut parts, body) = req.into_parts();
    parts.uri = match target.parse() {
        Ok(uri) => uri,
        Err(error) => {
            tracing::error!(%target, %error, "[proxy error] invalid upstream URI");
            return bad_gateway();
        }
    };
    // The upstream derives Host from the rewritten URI.
    parts.headers.remove(HOST);

    match client.request(Request::from_parts(parts, body)).await {
        Ok(response) => response.map(|body| body.map_err(std::io::Error::other).boxed_unsync()),
        Err(error) => {
            tracing::error!(%target, %error, "[proxy error]");
            bad_gateway()
        }
    }
}

fn bad_gateway() -> Response<SsrBody> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .body(full_body("bad gateway"))
        .unwrap()
}
