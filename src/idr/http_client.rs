//! Single-flight HTTP/1.1 GET used to request a keyframe from the source.
//!
//! The core's pipeline is thread-based, not async, so this deliberately
//! skips the `hyper`/`tokio` stack used by the signaling client in the
//! webrtc-facing sibling crates and instead opens a raw `TcpStream`, the
//! same way [`crate::rtp::socket::RtpSocket`] wraps a raw `UdpSocket`: one
//! short-lived connection per request, timed out via `socket2`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use crate::error::IdrError;

/// Issue `GET <path> HTTP/1.1` to `host:port` and return the parsed status
/// code. The whole exchange (connect, write, read the status line) is
/// bounded by `timeout`.
pub fn send_idr_request(host: &str, port: u16, path: &str, timeout: Duration) -> Result<u16, IdrError> {
    let addr: std::net::SocketAddr = format!("{host}:{port}").parse().map_err(|_| {
        IdrError::Malformed("bad idr host/port")
    })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))?;
    socket.connect_timeout(&addr.into(), timeout).map_err(to_idr_error)?;

    let mut stream: TcpStream = socket.into();

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: pixelpilot-idr/1.0\r\nAccept: */*\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).map_err(to_idr_error)?;

    let mut response = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                response.extend_from_slice(&chunk[..n]);
                if response.contains(&b'\n') {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(to_idr_error(e)),
        }
    }

    parse_status_code(&response)
}

/// `TimedOut`/`WouldBlock` map to the dedicated [`IdrError::Timeout`]
/// variant so a caller can distinguish "the source never answered" from a
/// genuine transport failure; everything else is a transport error.
fn to_idr_error(e: std::io::Error) -> IdrError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => IdrError::Timeout,
        _ => IdrError::Http(e),
    }
}

fn parse_status_code(response: &[u8]) -> Result<u16, IdrError> {
    let text = String::from_utf8_lossy(response);
    let line = text.lines().next().unwrap_or("");
    // "HTTP/1.1 200 OK"
    let code = line
        .split_whitespace()
        .nth(1)
        .ok_or(IdrError::Malformed("missing status code"))?;
    code.parse::<u16>()
        .map_err(|_| IdrError::Malformed("bad status code"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_line() {
        let resp = b"HTTP/1.1 204 No Content\r\nServer: x\r\n\r\n";
        assert_eq!(parse_status_code(resp).unwrap(), 204);
    }

    #[test]
    fn rejects_garbage() {
        let resp = b"not an http response";
        assert!(parse_status_code(resp).is_err());
    }

    #[test]
    fn end_to_end_against_loopback_listener() {
        use std::net::TcpListener;
        use std::thread;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).unwrap();
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        });

        let status = send_idr_request("127.0.0.1", port, "/request/idr", Duration::from_millis(500)).unwrap();
        assert_eq!(status, 200);
        handle.join().unwrap();
    }
}
