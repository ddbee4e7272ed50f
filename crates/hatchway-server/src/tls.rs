//! TLS termination for the HTTP front.
//!
//! Certificate and key are read once at startup; missing or malformed
//! material is a fatal configuration error, reported before the listener
//! binds.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::ServerConfig as RustlsServerConfig;
use tokio_rustls::TlsAcceptor;

use hatchway_common::error::{HatchwayError, Result};

use crate::config::TlsConfig;

pub fn load_acceptor(config: &TlsConfig) -> Result<TlsAcceptor> {
    let cert_file = File::open(&config.cert_file).map_err(|e| {
        HatchwayError::InvalidConfig(format!(
            "cannot read TLS certificate {}: {e}",
            config.cert_file.display()
        ))
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| {
            HatchwayError::InvalidConfig(format!(
                "malformed TLS certificate {}: {e}",
                config.cert_file.display()
            ))
        })?;

    let key_file = File::open(&config.key_file).map_err(|e| {
        HatchwayError::InvalidConfig(format!(
            "cannot read TLS key {}: {e}",
            config.key_file.display()
        ))
    })?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| {
            HatchwayError::InvalidConfig(format!(
                "malformed TLS key {}: {e}",
                config.key_file.display()
            ))
        })?
        .ok_or_else(|| {
            HatchwayError::InvalidConfig(format!(
                "no private key found in {}",
                config.key_file.display()
            ))
        })?;

    let server_config = RustlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| HatchwayError::InvalidConfig(format!("invalid TLS material: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
