//! The abstract datagram endpoint the session driver sends to and receives
//! from. A real `UdpEndpoint` is provided for the binaries; tests drive the
//! engine over an in-memory loopback pair instead.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// What [`Endpoint::receive`] produced.
pub enum ReceiveOutcome {
	Packet(Vec<u8>, SocketAddr),
	Timeout,
}

/// A datagram endpoint. Blocking by design: `receive` is the only method
/// that ever waits, and sessions are driven one per OS thread (or blocking
/// task), so there's no reason to make this async.
pub trait Endpoint: Send + Sync {
	fn send(&self, bytes: &[u8], peer: SocketAddr) -> io::Result<()>;
	fn receive(&self, timeout: Duration) -> io::Result<ReceiveOutcome>;
	fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// The production endpoint, a thin wrapper over a connected-less
/// `std::net::UdpSocket` with a per-call read timeout set via
/// `set_read_timeout` rather than async I/O.
pub struct UdpEndpoint {
	socket: std::net::UdpSocket,
}

impl UdpEndpoint {
	pub fn bind(addr: SocketAddr) -> io::Result<Self> {
		let socket = std::net::UdpSocket::bind(addr)?;
		Ok(Self { socket })
	}

	pub fn from_socket(socket: std::net::UdpSocket) -> Self {
		Self { socket }
	}
}

impl Endpoint for UdpEndpoint {
	fn send(&self, bytes: &[u8], peer: SocketAddr) -> io::Result<()> {
		self.socket.send_to(bytes, peer).map(|_| ())
	}

	fn receive(&self, timeout: Duration) -> io::Result<ReceiveOutcome> {
		self.socket.set_read_timeout(Some(timeout))?;
		let mut buf = vec![0u8; 65536];
		match self.socket.recv_from(&mut buf) {
			Ok((n, from)) => {
				buf.truncate(n);
				Ok(ReceiveOutcome::Packet(buf, from))
			}
			Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(ReceiveOutcome::Timeout),
			Err(e) => Err(e),
		}
	}

	fn local_addr(&self) -> io::Result<SocketAddr> {
		self.socket.local_addr()
	}
}
