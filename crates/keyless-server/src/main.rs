//! Keyless signing server binary.
//!
//! # Usage
//!
//! ```bash
//! keyless-server \
//!     --port 4433 \
//!     --server-cert server.pem --server-key server-key.pem \
//!     --private-key-directory /etc/keyless/keys \
//!     --cipher-list TLS13_AES_256_GCM_SHA384 \
//!     --ca-file ca.pem
//! ```

use std::{fs, path::PathBuf, process::ExitCode};

use clap::Parser;
use keyless_server::{Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keyless signing server: performs RSA/ECDSA private-key operations for
/// remote mTLS clients that hold the certificate but not the key.
#[derive(Parser, Debug)]
#[command(name = "keyless-server")]
#[command(about = "Keyless signing server")]
#[command(version)]
struct Args {
    /// TCP port to listen on.
    #[arg(long)]
    port: u16,

    /// Path to the server's TLS certificate (PEM).
    #[arg(long)]
    server_cert: PathBuf,

    /// Path to the server's TLS private key (PEM).
    #[arg(long)]
    server_key: PathBuf,

    /// Directory of `*.key` PEM private keys to serve.
    #[arg(long)]
    private_key_directory: PathBuf,

    /// Comma-separated list of acceptable TLS cipher suite names.
    #[arg(long)]
    cipher_list: String,

    /// Path to the CA bundle (PEM) trusted for client certificate verification.
    #[arg(long)]
    ca_file: PathBuf,

    /// Number of concurrent acceptor tasks sharing the listener.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=32))]
    num_workers: u8,

    /// Path to write the process id to on startup.
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Suppress non-fatal logs.
    #[arg(long)]
    silent: bool,

    /// Log level (trace, debug, info, warn, error). Overridden by `RUST_LOG`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "fatal error");
            ExitCode::FAILURE
        },
    }
}

fn init_logging(args: &Args) {
    let default_level = if args.silent { "error" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(pid_file) = &args.pid_file {
        fs::write(pid_file, std::process::id().to_string())?;
    }

    let config = ServerConfig {
        port: args.port,
        server_cert: args.server_cert,
        server_key: args.server_key,
        private_key_directory: args.private_key_directory,
        cipher_list: args.cipher_list,
        ca_file: args.ca_file,
        num_workers: args.num_workers,
    };

    let server = Server::bind(config).await?;
    tracing::info!(addr = %server.local_addr()?, "keyless server listening");

    server.run(shutdown_signal()).await;
    tracing::info!("shutdown complete");

    if let Some(pid_file) = &args.pid_file {
        let _ = fs::remove_file(pid_file);
    }

    Ok(())
}

/// Resolves on SIGTERM or SIGINT (Ctrl-C), whichever comes first.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
