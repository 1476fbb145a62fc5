//! UDP socket plumbing for both ends of the stream.
//!
//! [`FrameTransmitter`] writes the datagrams of one frame to a fixed
//! destination in order. The bind helpers size kernel buffers through
//! `socket2` so a burst of fragments fits in the socket queue.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use socket2::SockRef;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::CamError;

/// Default kernel send/receive buffer request.
pub const DEFAULT_SOCKET_BUFFER: usize = 1 << 20;

// ── Socket helpers ───────────────────────────────────────────────

/// Bind a UDP socket, reporting the address on failure.
pub async fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, CamError> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| CamError::Bind { addr, source })
}

/// Request a kernel send buffer of `bytes`. Returns the granted size.
pub fn set_send_buffer(socket: &UdpSocket, bytes: usize) -> Result<usize, CamError> {
    let sock = SockRef::from(socket);
    sock.set_send_buffer_size(bytes)?;
    let granted = sock.send_buffer_size()?;
    debug!(requested = bytes, granted, "send buffer sized");
    Ok(granted)
}

/// Request a kernel receive buffer of `bytes`. Returns the granted size.
pub fn set_recv_buffer(socket: &UdpSocket, bytes: usize) -> Result<usize, CamError> {
    let sock = SockRef::from(socket);
    sock.set_recv_buffer_size(bytes)?;
    let granted = sock.recv_buffer_size()?;
    debug!(requested = bytes, granted, "receive buffer sized");
    Ok(granted)
}

/// Receive errors after which the socket is unusable.
pub fn is_terminal_receive_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported
    )
}

// ── FrameTransmitter ─────────────────────────────────────────────

/// Outcome of sending one frame's datagrams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub datagrams: usize,
    pub bytes: usize,
    pub failed: usize,
}

/// Sends fragment datagrams to one destination.
pub struct FrameTransmitter {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    datagrams_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl FrameTransmitter {
    /// Wrap an already-bound `UdpSocket` targeting `remote_addr`.
    pub fn new(socket: UdpSocket, remote_addr: SocketAddr) -> Self {
        Self {
            socket,
            remote_addr,
            datagrams_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Bind `local` and target `remote`, with a `send_buffer` byte
    /// kernel buffer.
    pub async fn bind(
        local: SocketAddr,
        remote: SocketAddr,
        send_buffer: usize,
    ) -> Result<Self, CamError> {
        let socket = bind_udp(local).await?;
        if let Err(e) = set_send_buffer(&socket, send_buffer) {
            warn!("could not size send buffer: {e}");
        }
        Ok(Self::new(socket, remote))
    }

    /// Send `datagrams` in order.
    ///
    /// A failed send is logged and counted; the remaining datagrams of
    /// the frame are still attempted.
    pub async fn send_datagrams(&self, datagrams: &[Bytes]) -> SendReport {
        let mut report = SendReport::default();
        for (idx, datagram) in datagrams.iter().enumerate() {
            match self.socket.send_to(datagram, self.remote_addr).await {
                Ok(n) => {
                    report.datagrams += 1;
                    report.bytes += n;
                }
                Err(e) => {
                    if report.failed == 0 {
                        warn!(fragment = idx, "UDP send to {}: {e}", self.remote_addr);
                    }
                    report.failed += 1;
                }
            }
        }

        self.datagrams_sent
            .fetch_add(report.datagrams as u64, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(report.bytes as u64, Ordering::Relaxed);
        report
    }

    /// Total datagrams sent.
    pub fn datagrams_sent(&self) -> u64 {
        self.datagrams_sent.load(Ordering::Relaxed)
    }

    /// Total bytes sent, headers included.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

// ── Tests ────────────────────────────────────────────────────────
