//! Per-connection async task: the production driver for
//! [`keyless_core::ConnectionEngine`].
//!
//! Pairs a reader loop (NEED_HEADER → NEED_PAYLOAD → dispatch) with a
//! writer loop drained from a bounded `mpsc` channel standing in for the
//! fixed-size outbound queue. Everything that would be a `.await` suspension
//! point on `WANT_READ`/`WANT_WRITE` in the source design is, here, exactly
//! an `.await` on `tokio_rustls`'s `AsyncRead`/`AsyncWrite` impls.

use std::net::SocketAddr;

use bytes::Bytes;
use keyless_core::{ConnectionEngine, ConnectionError, HeaderDecision};
use keyless_proto::FrameHeader;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::{mpsc, watch},
};
use tokio_rustls::server::TlsStream;

/// The outbound queue bound: at most this many encoded responses may be in
/// flight for a single connection at once.
const OUTBOUND_QUEUE_CAPACITY: usize = 16;

/// Drive one accepted mTLS connection to completion.
///
/// Returns once the connection is closed, either cleanly (peer EOF), due to
/// a transport/protocol condition, or because `shutdown` fired. Never panics
/// on peer-controlled input.
pub async fn run(
    engine: ConnectionEngine,
    stream: TlsStream<TcpStream>,
    peer: SocketAddr,
    shutdown: watch::Receiver<bool>,
) {
    let (read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_CAPACITY);

    let writer = tokio::spawn(drain_outbound(write_half, rx));
    read_loop(engine, read_half, &tx, peer, shutdown).await;
    drop(tx);

    if let Err(err) = writer.await {
        tracing::warn!(%peer, %err, "writer task panicked");
    }
}

async fn read_loop(
    engine: ConnectionEngine,
    mut read_half: ReadHalf<TlsStream<TcpStream>>,
    tx: &mpsc::Sender<Bytes>,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut header_buf = [0u8; FrameHeader::SIZE];

    loop {
        let header_result = tokio::select! {
            result = read_half.read_exact(&mut header_buf) => result,
            _ = shutdown.changed() => {
                tracing::debug!(%peer, "connection terminated for shutdown");
                return;
            },
        };
        if let Err(source) = header_result {
            let err = ConnectionError::Transport(source);
            if !err.is_clean_close() {
                tracing::debug!(%peer, %err, "header read failed");
            }
            return;
        }

        let decision = match engine.handle_header(&header_buf) {
            Ok(decision) => decision,
            Err(response) => {
                if !enqueue(tx, response, peer).await {
                    return;
                }
                continue;
            },
        };

        let length = match decision {
            HeaderDecision::Dispatch { length } => length,
            HeaderDecision::VersionMismatch { discard_len, response } => {
                if !enqueue(tx, response, peer).await {
                    return;
                }
                if !discard(&mut read_half, discard_len, peer).await {
                    return;
                }
                continue;
            },
        };

        let mut payload = vec![0u8; length as usize];
        if let Err(source) = read_half.read_exact(&mut payload).await {
            let err = ConnectionError::Transport(source);
            tracing::debug!(%peer, %err, "payload read failed");
            return;
        }

        let response = engine.handle_request(request_id(&header_buf), &payload);
        if !enqueue(tx, response, peer).await {
            return;
        }
    }
}

fn request_id(header_buf: &[u8; FrameHeader::SIZE]) -> u32 {
    FrameHeader::decode(header_buf).map(|header| header.id()).unwrap_or(0)
}

/// Discard exactly `len` bytes: the precise-discard recovery after a
/// version-mismatch response, resynchronizing to the next frame boundary.
async fn discard(
    read_half: &mut ReadHalf<TlsStream<TcpStream>>,
    len: u16,
    peer: SocketAddr,
) -> bool {
    let mut remaining = vec![0u8; len as usize];
    match read_half.read_exact(&mut remaining).await {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(%peer, %err, "discard after version mismatch failed");
            false
        },
    }
}

/// Enqueue an encoded frame for the writer task. A full queue means a peer
/// isn't draining responses fast enough for this bound; it is logged as an
/// error and the connection is torn down rather than silently dropping or
/// blocking indefinitely.
async fn enqueue(tx: &mpsc::Sender<Bytes>, frame: Bytes, peer: SocketAddr) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            let err = ConnectionError::Internal("outbound queue overflow".to_string());
            tracing::error!(%peer, %err, "terminating connection");
            false
        },
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn drain_outbound(mut write_half: WriteHalf<TlsStream<TcpStream>>, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = write_half.write_all(&frame).await {
            tracing::debug!(%err, "write failed");
            return;
        }
    }
    let _ = write_half.shutdown().await;
}
