use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;

use hatchway_common::error::{HatchwayError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One backend API request.
///
/// Cookies should be sent only to our own backend: any other origin could
/// steal the access token.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
    pub query: Option<HashMap<String, String>>,
    /// Raw cookie header forwarded from the inbound page request
    pub cookies: String,
}

impl BackendRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            query: None,
            cookies: String::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = cookies.into();
        self
    }
}

/// Backend response, successful or not.
///
/// Errors the backend expressed as an HTTP status are represented in this
/// same shape with `ok = false`; only transport-level failures surface as
/// `Err` from [`BackendClient::fetch`].
#[derive(Debug, Clone)]
pub struct BackendAnswer {
    pub ok: bool,
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// All `Set-Cookie` values, in response order
    pub set_cookie: Vec<String>,
    pub body: Value,
}

impl BackendAnswer {
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Transport seam between the pipeline and the backend API.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn fetch(&self, request: BackendRequest) -> Result<BackendAnswer>;
}

/// Production backend client over HTTP/1.1.
///
/// Uses the hyper legacy client, which pools connections internally, so one
/// instance is shared by all concurrent requests.
pub struct HttpBackendClient {
    base_url: String,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpBackendClient {
    /// Creates a client for the given backend base URL, e.g.
    /// `http://localhost:9110`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_uri(&self, request: &BackendRequest) -> String {
        format!(
            "{}{}{}",
            self.base_url,
            request.path,
            query_to_string(request.query.as_ref())
        )
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn fetch(&self, request: BackendRequest) -> Result<BackendAnswer> {
        let uri = self.build_uri(&request);
        tracing::debug!(method = %request.method, path = %request.path, "[requestInternal]");

        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(&uri)
            .header(CONTENT_TYPE, "application/json");
        if !request.cookies.is_empty() {
            builder = builder.header(COOKIE, request.cookies.as_str());
        }

        let body = match &request.body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };
        let http_request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| HatchwayError::Transport(format!("Failed to build request: {e}")))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(http_request))
            .await
            .map_err(|_| HatchwayError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| HatchwayError::Backend(format!("{uri}: {e}")))?;

        let status = response.status();
        let mut headers = HashMap::new();
        let mut set_cookie = Vec::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                if name == &SET_COOKIE {
                    set_cookie.push(value.to_string());
                }
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| HatchwayError::Backend(format!("Failed to read response body: {e}")))?
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "[requestInternal.done]"
        );

        Ok(BackendAnswer {
            ok: status.is_success(),
            status: status.as_u16(),
            headers,
            set_cookie,
            body,
        })
    }
}

/// Renders a query map as a `?key=value` string, empty when there is
/// nothing to append.
pub fn query_to_string(query: Option<&HashMap<String, String>>) -> String {
    let Some(query) = query else {
        return String::new();
    };
    if query.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<(&String, &String)> = query.iter().collect();
    pairs.sort();
    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("?{joined}")
}
