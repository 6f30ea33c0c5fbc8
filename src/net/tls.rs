//! TLS configuration and certificate loading.
//!
//! # Design Decisions
//! - ring provider with the key exchange groups narrowed to the configured curves
//! - ALPN offers h2 before http/1.1 so browsers negotiate HTTP/2
//! - Server cipher order wins when `prefer_server_cipher_suites` is set

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::{ring, SupportedKxGroup};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::config::{Curve, TlsConfig};

/// Protocols offered during the handshake, in preference order.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Build the server-side rustls configuration.
pub fn build_server_config(config: &TlsConfig) -> Result<ServerConfig, TlsError> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let mut provider = ring::default_provider();
    provider.kx_groups = kx_groups(&config.curve_preferences);

    let mut server = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    server.ignore_client_order = config.prefer_server_cipher_suites;
    server.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    tracing::info!(
        cert = ?config.cert_path,
        curves = ?config.curve_preferences,
        "TLS configured"
    );
    Ok(server)
}

/// Map configured curves to ring key exchange groups, keeping order and
/// dropping repeats.
pub fn kx_groups(curves: &[Curve]) -> Vec<&'static dyn SupportedKxGroup> {
    let mut seen = Vec::with_capacity(curves.len());
    curves
        .iter()
        .filter(|curve| {
            if seen.contains(*curve) {
                return false;
            }
            seen.push(**curve);
            true
        })
        .map(|curve| match curve {
            Curve::P256 => ring::kx_group::SECP256R1,
            Curve::P384 => ring::kx_group::SECP384R1,
            Curve::X25519 => ring::kx_group::X25519,
        })
        .collect()
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
