//! Keyless signing server.
//!
//! Production "glue" that wraps [`keyless_core`]'s Sans-IO connection engine
//! with real mTLS I/O via `tokio-rustls`. [`Server::bind`] loads the
//! keystore and TLS context; [`Server::run`] accepts connections across
//! `--num-workers` concurrent acceptor tasks sharing one listener, spawning
//! one task per connection, until a shutdown signal arrives.
//!
//! # Components
//!
//! - [`MtlsTransport`]: TCP listener + TLS acceptor requiring client certs
//! - [`connection_task::run`]: the per-connection read/dispatch/write loop
//! - [`SystemEnv`]: production RNG, used only for connection ids

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection_task;
mod error;
mod system_env;
mod transport;

use std::{path::PathBuf, sync::Arc};

pub use error::ServerError;
use keyless_core::{ConnectionEngine, Environment, Keystore};
pub use system_env::SystemEnv;
use tokio::task::JoinSet;
pub use transport::MtlsTransport;

/// Bootstrap configuration for the production server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// PEM-encoded server certificate.
    pub server_cert: PathBuf,
    /// PEM-encoded server private key.
    pub server_key: PathBuf,
    /// Directory of `*.key` PEM private keys to serve.
    pub private_key_directory: PathBuf,
    /// Comma-separated list of acceptable cipher suite names.
    pub cipher_list: String,
    /// PEM-encoded CA bundle trusted for client certificate verification.
    pub ca_file: PathBuf,
    /// Number of concurrent acceptor tasks sharing the listener (1..32).
    pub num_workers: u8,
}

/// The running keyless signing server.
pub struct Server {
    transport: Arc<MtlsTransport>,
    engine: ConnectionEngine,
    num_workers: u8,
    env: SystemEnv,
}

impl Server {
    /// Load the keystore and TLS context and bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if the key directory is empty or
    /// unreadable, or if the TLS context or socket cannot be built. All of
    /// these are fatal bootstrap conditions.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let keystore = Keystore::load_dir(&config.private_key_directory)?;
        tracing::info!(key_count = keystore.len(), "keystore loaded");

        let transport = MtlsTransport::bind(
            config.port,
            &config.server_cert,
            &config.server_key,
            &config.ca_file,
            &config.cipher_list,
        )
        .await?;

        Ok(Self {
            transport: Arc::new(transport),
            engine: ConnectionEngine::new(Arc::new(keystore)),
            num_workers: config.num_workers,
            env: SystemEnv::new(),
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Accept connections until `shutdown` resolves, then stop accepting,
    /// signal every in-flight connection to terminate, await their
    /// completion, and return.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let mut workers = JoinSet::new();
        for worker_id in 0..self.num_workers {
            let transport = Arc::clone(&self.transport);
            let engine = self.engine.clone();
            let env = self.env.clone();
            let shutdown_rx = shutdown_rx.clone();
            workers.spawn(accept_loop(worker_id, transport, engine, env, shutdown_rx));
        }

        shutdown.await;
        tracing::info!("shutdown signal received, stopping acceptor tasks");
        let _ = shutdown_tx.send(true);
        while workers.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use rsa::{RsaPrivateKey, pkcs1::EncodeRsaPrivateKey};
    use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
    use tokio::net::TcpStream;

    use super::*;
    use crate::transport::{TrustedChain, trusted_chain_with_client_cert};

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile should create");
        file.write_all(contents.as_bytes()).expect("write should succeed");
        file
    }

    fn parse_certs(pem: &str) -> Vec<CertificateDer<'static>> {
        rustls_pemfile::certs(&mut pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .expect("cert PEM should parse")
    }

    fn parse_key(pem: &str) -> PrivateKeyDer<'static> {
        rustls_pemfile::private_key(&mut pem.as_bytes())
            .expect("key PEM should parse")
            .expect("key PEM should contain a key")
    }

    async fn bind_test_server(chain: &TrustedChain) -> (Server, tempfile::TempDir) {
        let cert_file = write_temp(&chain.server_cert_pem);
        let key_file = write_temp(&chain.server_key_pem);
        let ca_file = write_temp(&chain.ca_pem);

        let key_dir = tempfile::tempdir().expect("tempdir should create");
        let mut rng = rand::thread_rng();
        let signing_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation should succeed");
        let pem = signing_key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).expect("key should encode");
        std::fs::write(key_dir.path().join("signing.key"), pem.as_str()).expect("key file should write");

        let config = ServerConfig {
            port: 0,
            server_cert: cert_file.path().to_path_buf(),
            server_key: key_file.path().to_path_buf(),
            private_key_directory: key_dir.path().to_path_buf(),
            cipher_list: String::new(),
            ca_file: ca_file.path().to_path_buf(),
            num_workers: 1,
        };

        // `bind` reads the cert/key/CA files synchronously before returning,
        // so the temp files can be dropped once it completes.
        let server = Server::bind(config).await.expect("bind should succeed");
        (server, key_dir)
    }

    #[tokio::test]
    async fn run_stops_promptly_after_shutdown_with_a_live_connection() {
        let chain = trusted_chain_with_client_cert();
        let (server, _key_dir) = bind_test_server(&chain).await;
        let addr = server.local_addr().expect("local_addr should succeed");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let run_task = tokio::spawn(async move {
            server
                .run(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        // Drive one real mTLS connection through the accept loop so the
        // test covers draining an in-flight connection task, not just an
        // idle acceptor.
        let mut roots = rustls::RootCertStore::empty();
        for cert in parse_certs(&chain.ca_pem) {
            roots.add(cert).expect("CA cert should be trusted");
        }
        let client_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(
                parse_certs(&chain.client_cert_pem),
                parse_key(&chain.client_key_pem),
            )
            .expect("client TLS config should build");
        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));

        let tcp_stream = TcpStream::connect(addr).await.expect("connect should succeed");
        let server_name = ServerName::try_from("localhost").expect("server name should parse");
        let _client_stream =
            connector.connect(server_name, tcp_stream).await.expect("client handshake should succeed");

        shutdown_tx.send(()).expect("shutdown receiver should still be alive");

        tokio::time::timeout(std::time::Duration::from_secs(5), run_task)
            .await
            .expect("run() should return promptly after shutdown")
            .expect("server task should not panic");
    }
}

async fn accept_loop(
    worker_id: u8,
    transport: Arc<MtlsTransport>,
    engine: ConnectionEngine,
    env: SystemEnv,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        let (tcp_stream, peer) = tokio::select! {
            accepted = transport.accept_tcp() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::error!(worker_id, %err, "accept failed");
                    continue;
                },
            },
            _ = shutdown.changed() => break,
        };

        let tls_stream = match transport.accept_tls(tcp_stream).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!(worker_id, %peer, %err, "TLS handshake failed");
                continue;
            },
        };

        let connection_id = env.random_u64();
        tracing::debug!(worker_id, %peer, connection_id, "connection accepted");

        let engine = engine.clone();
        let shutdown_rx = shutdown.clone();
        connections.spawn(async move {
            connection_task::run(engine, tls_stream, peer, shutdown_rx).await;
            tracing::debug!(connection_id, "connection closed");
        });

        // Bound the number of tracked join handles; completed tasks are
        // reaped opportunistically so the set doesn't grow without limit.
        while connections.try_join_next().is_some() {}
    }

    while connections.join_next().await.is_some() {}
}
