//! # Hatchway CLI Entry Point
//!
//! Main binary for the Hatchway SSR server.
//!
//! ## Usage
//!
//! ```bash
//! # Serve with defaults (backend on localhost:9110, plain HTTP on :3000)
//! hatchway
//!
//! # Full configuration
//! hatchway -b 0.0.0.0:3000 \
//!   --backend http://localhost:9110 \
//!   --public-dir ./public \
//!   --assets-manifest ./build/assets.json \
//!   --tls-cert ./tls/server.crt --tls-key ./tls/server.key
//! ```
//!
//! ## Environment
//!
//! Flags win over environment variables. Recognized variables:
//! `BACKEND_URL`, `HATCHWAY_PUBLIC_DIR`, `HATCHWAY_ASSETS_MANIFEST`,
//! `TLS_CERT_FILE`, `TLS_KEY_FILE`. Log level comes from `RUST_LOG`
//! (default `info`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;

use hatchway_client::{BackendClient, HttpBackendClient};
use hatchway_server::{
    AssetManifest, DefaultRenderer, GateConfig, HttpServer, RenderPipeline, ServerConfig,
    SessionGate, StreamAssembler, TlsConfig,
};

mod pages;

/// Validates that a URL string starts with http:// or https://
fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

#[derive(FromArgs)]
/// Hatchway - server-side rendering with per-request state scoping
struct Cli {
    /// address to bind the HTTP server to
    ///
    /// Defaults to "0.0.0.0:3000".
    #[argh(option, short = 'b', default = "\"0.0.0.0:3000\".into()")]
    bind: String,

    /// upstream backend base URL
    ///
    /// Falls back to the BACKEND_URL environment variable, then to
    /// http://localhost:9110. Must include the http:// or https:// prefix.
    #[argh(option, long = "backend")]
    backend: Option<String>,

    /// directory served as static files before SSR
    ///
    /// Falls back to HATCHWAY_PUBLIC_DIR. Static serving is disabled when
    /// neither is set.
    #[argh(option, long = "public-dir")]
    public_dir: Option<PathBuf>,

    /// path to the client asset manifest JSON
    ///
    /// Falls back to HATCHWAY_ASSETS_MANIFEST. The streamed document
    /// references no client bundle when neither is set.
    #[argh(option, long = "assets-manifest")]
    assets_manifest: Option<PathBuf>,

    /// TLS certificate file (PEM); enables HTTPS together with --tls-key
    ///
    /// Falls back to TLS_CERT_FILE.
    #[argh(option, long = "tls-cert")]
    tls_cert: Option<PathBuf>,

    /// TLS private key file (PEM)
    ///
    /// Falls back to TLS_KEY_FILE.
    #[argh(option, long = "tls-key")]
    tls_key: Option<PathBuf>,

    /// redirect destination for session-gated pages
    #[argh(option, long = "stopped-path", default = "\"/login\".into()")]
    stopped_path: String,

    /// redirect destination for anonymous-only pages
    #[argh(option, long = "home-path", default = "\"/\".into()")]
    home_path: String,

    /// bound on page data loading in milliseconds
    ///
    /// On expiry the page renders with whatever state is available.
    #[argh(option, long = "activation-timeout-ms", default = "5000")]
    activation_timeout_ms: u64,
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().map(PathBuf::from)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level is INFO; RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let backend_url = cli
        .backend
        .clone()
        .or_else(|| std::env::var("BACKEND_URL").ok())
        .unwrap_or_else(|| "http://localhost:9110".to_string());
    validate_http_url(&backend_url, "backend URL")?;
    tracing::info!("Upstream backend: {}", backend_url);

    let public_dir = cli.public_dir.clone().or_else(|| env_path("HATCHWAY_PUBLIC_DIR"));
    if let Some(dir) = &public_dir {
        tracing::info!("Serving static files from {}", dir.display());
    }

    let assets_manifest = cli
        .assets_manifest
        .clone()
        .or_else(|| env_path("HATCHWAY_ASSETS_MANIFEST"));
    let assets = match &assets_manifest {
        Some(path) => {
            let manifest = AssetManifest::load(path).map_err(|e| {
                anyhow::anyhow!("Failed to load asset manifest {}: {e}", path.display())
            })?;
            tracing::info!("Loaded asset manifest from {}", path.display());
            manifest
        }
        None => AssetManifest::empty(),
    };

    let tls_cert = cli.tls_cert.clone().or_else(|| env_path("TLS_CERT_FILE"));
    let tls_key = cli.tls_key.clone().or_else(|| env_path("TLS_KEY_FILE"));
    let tls = match (tls_cert, tls_key) {
        (Some(cert_file), Some(key_file)) => {
            tracing::info!(
                cert = %cert_file.display(),
                key = %key_file.display(),
                "TLS enabled"
            );
            Some(TlsConfig {
                cert_file,
                key_file,
            })
        }
        (None, None) => None,
        _ => anyhow::bail!("--tls-cert and --tls-key must be provided together"),
    };

    let backend: Arc<dyn BackendClient> = Arc::new(HttpBackendClient::new(&backend_url));
    let gate = Arc::new(SessionGate::new(
        Arc::clone(&backend),
        GateConfig {
            stopped_path: cli.stopped_path.clone(),
            home_path: cli.home_path.clone(),
        },
    ));

    let pipeline = Arc::new(
        RenderPipeline::new(
            pages::routes(),
            pages::state_template()?,
            pages::registry(backend, Arc::clone(&gate)),
            gate,
            Arc::new(DefaultRenderer),
            StreamAssembler::new(Arc::new(assets)),
        )
        .with_activation_timeout(Duration::from_millis(cli.activation_timeout_ms)),
    );

    let config = ServerConfig {
        backend_url,
        public_dir,
        tls,
        ..ServerConfig::default()
    };
    let server = HttpServer::new(pipeline, config)?;

    let addr: SocketAddr = cli
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", cli.bind, e))?;
    server.run(addr).await?;

    Ok(())
}
