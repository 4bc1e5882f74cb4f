//! mTLS transport: a TCP listener wrapped in a `rustls` server acceptor
//! that requires and verifies a client certificate.
//!
//! # Security
//!
//! Client certificates are mandatory and verified against a configured CA
//! root at verification depth 1. TLS 1.2 is the minimum protocol version.
//! Self-signed server certificates are only generated for tests; production
//! configuration always loads cert/key/CA from disk.

use std::{fs, net::SocketAddr, path::Path, sync::Arc};

use rustls::{ServerConfig, server::WebPkiClientVerifier};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, server::TlsStream};

use crate::error::ServerError;

/// Bound TCP listener plus the TLS acceptor used to upgrade each accepted
/// connection to mTLS.
pub struct MtlsTransport {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl MtlsTransport {
    /// Bind `port` and build a TLS acceptor requiring client certificates
    /// signed by `ca_file`, presenting `server_cert`/`server_key`, and
    /// restricting the negotiated cipher suites to `cipher_list`.
    pub async fn bind(
        port: u16,
        server_cert: &Path,
        server_key: &Path,
        ca_file: &Path,
        cipher_list: &str,
    ) -> Result<Self, ServerError> {
        let config = build_server_config(server_cert, server_key, ca_file, cipher_list)?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, "mTLS transport bound");

        Ok(Self { listener, acceptor: TlsAcceptor::from(Arc::new(config)) })
    }

    /// Accept the next raw TCP connection. The TLS handshake is performed
    /// separately (via [`Self::accept_tls`]) so accept-loop failures and
    /// handshake failures are logged at different granularity.
    pub async fn accept_tcp(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.listener.accept().await.map_err(ServerError::from)
    }

    /// Perform the mTLS handshake over an already-accepted TCP stream.
    pub async fn accept_tls(&self, stream: TcpStream) -> Result<TlsStream<TcpStream>, ServerError> {
        self.acceptor
            .accept(stream)
            .await
            .map_err(|e| ServerError::Transport(format!("TLS handshake failed: {e}")))
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::from)
    }
}

fn build_server_config(
    server_cert: &Path,
    server_key: &Path,
    ca_file: &Path,
    cipher_list: &str,
) -> Result<ServerConfig, ServerError> {
    let cert_pem = fs::read(server_cert).map_err(|e| {
        ServerError::Config(format!("failed to read server cert '{}': {e}", server_cert.display()))
    })?;
    let key_pem = fs::read(server_key).map_err(|e| {
        ServerError::Config(format!("failed to read server key '{}': {e}", server_key.display()))
    })?;
    let ca_pem = fs::read(ca_file).map_err(|e| {
        ServerError::Config(format!("failed to read CA file '{}': {e}", ca_file.display()))
    })?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse server certificate: {e}")))?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse server key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found in server key file".to_string()))?;

    let mut roots = rustls::RootCertStore::empty();
    for ca_cert in rustls_pemfile::certs(&mut &ca_pem[..]) {
        let ca_cert =
            ca_cert.map_err(|e| ServerError::Config(format!("failed to parse CA cert: {e}")))?;
        roots
            .add(ca_cert)
            .map_err(|e| ServerError::Config(format!("failed to trust CA cert: {e}")))?;
    }

    let client_verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| ServerError::Config(format!("failed to build client verifier: {e}")))?;

    let provider = filtered_crypto_provider(cipher_list)?;

    let config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(|e| ServerError::Config(format!("unsupported protocol versions: {e}")))?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    Ok(config)
}

/// Build a crypto provider whose cipher suites are restricted to the names
/// in `cipher_list` (comma-separated, matched case-insensitively against
/// `rustls`' suite names). Unknown names are logged and skipped; an empty
/// resulting set falls back to the provider's full default list.
fn filtered_crypto_provider(cipher_list: &str) -> Result<rustls::crypto::CryptoProvider, ServerError> {
    let base = rustls::crypto::ring::default_provider();
    let requested: Vec<&str> = cipher_list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();

    if requested.is_empty() {
        return Ok(base);
    }

    let mut selected = Vec::new();
    for suite in &base.cipher_suites {
        let name = format!("{:?}", suite.suite());
        if requested.iter().any(|req| name.eq_ignore_ascii_case(req)) {
            selected.push(*suite);
        }
    }

    if selected.is_empty() {
        tracing::warn!(%cipher_list, "no configured cipher suite name matched; using provider defaults");
        return Ok(base);
    }

    Ok(rustls::crypto::CryptoProvider { cipher_suites: selected, ..base })
}

#[cfg(test)]
fn new_ca() -> (rcgen::KeyPair, rcgen::Certificate) {
    let ca_key = rcgen::KeyPair::generate().expect("key generation should succeed");
    let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).expect("params should build");
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).expect("CA cert should self-sign");
    (ca_key, ca_cert)
}

#[cfg(test)]
fn leaf_signed_by(subject: &str, ca_key: &rcgen::KeyPair, ca_cert: &rcgen::Certificate) -> (String, String) {
    let key = rcgen::KeyPair::generate().expect("key generation should succeed");
    let params = rcgen::CertificateParams::new(vec![subject.to_string()]).expect("params should build");
    let cert = params.signed_by(&key, ca_cert, ca_key).expect("leaf cert should sign");
    (cert.pem(), key.serialize_pem())
}

/// Generate a self-signed certificate/key/CA triple for tests.
#[cfg(test)]
pub(crate) fn self_signed_chain() -> (String, String, String) {
    let (ca_key, ca_cert) = new_ca();
    let (server_pem, server_key_pem) = leaf_signed_by("localhost", &ca_key, &ca_cert);
    (server_pem, server_key_pem, ca_cert.pem())
}

/// A CA root plus a server cert and a client cert both signed by that same
/// root, so a client presenting `client_cert_pem` is trusted by a server
/// bound with `ca_pem`/`server_cert_pem`.
#[cfg(test)]
pub(crate) struct TrustedChain {
    pub ca_pem: String,
    pub server_cert_pem: String,
    pub server_key_pem: String,
    pub client_cert_pem: String,
    pub client_key_pem: String,
}

#[cfg(test)]
pub(crate) fn trusted_chain_with_client_cert() -> TrustedChain {
    let (ca_key, ca_cert) = new_ca();
    let (server_cert_pem, server_key_pem) = leaf_signed_by("localhost", &ca_key, &ca_cert);
    let (client_cert_pem, client_key_pem) = leaf_signed_by("keyless-client", &ca_key, &ca_cert);

    TrustedChain {
        ca_pem: ca_cert.pem(),
        server_cert_pem,
        server_key_pem,
        client_cert_pem,
        client_key_pem,
    }
}

/// A client cert signed by an unrelated root, for the rejection path.
#[cfg(test)]
pub(crate) fn untrusted_client_cert() -> (String, String) {
    let (other_ca_key, other_ca_cert) = new_ca();
    leaf_signed_by("keyless-client", &other_ca_key, &other_ca_cert)
}
