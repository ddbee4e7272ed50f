use std::path::PathBuf;
use std::time::Duration;

/// TLS material for HTTPS termination.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Configuration of the HTTP front.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upstream backend base URL, e.g. `http://localhost:9110`
    pub backend_url: String,
    /// Directory served as static files before SSR is attempted
    pub public_dir: Option<PathBuf>,
    /// Optional TLS material; plain HTTP when absent
    pub tls: Option<TlsConfig>,
    /// Path prefix proxied verbatim to the backend
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:9110".to_string(),
            public_dir: None,
            tls: None,
            api_prefix: "/api/internal".to_string(),
        }
    }
}

/// Bound on the hatch activation all-settled wait. On expiry the pipeline
/// renders with whatever state is available instead of hanging.
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);
