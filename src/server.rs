//! The listening dispatcher and per-request session handler: a small struct
//! owning the bound socket and root directory, a `run` loop that accepts
//! datagrams and spawns one task per request, and a request handler that
//! resolves a path, opens a file and then hands off to the protocol engine.

use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[allow(unused)]
use log::{debug, error, info, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::tftp::context::{Role, SessionContext};
use crate::tftp::endpoint::{Endpoint, UdpEndpoint};
use crate::tftp::error::{ErrorCode, RequestError};
use crate::tftp::packet::Packet;
use crate::tftp::session::run_session;
use crate::tftp::state_machine::{transition, Event, SessionState};
use crate::tftp::stream::{BufferWriteStream, FileReadStream, FileWriteStream, ReadStream, TransferStream, WriteStream};

type Result<T> = std::result::Result<T, RequestError>;

/// Resolves `filename` (as sent on the wire, NUL-terminated bytes) against
/// `root`, rejecting any path that would escape it. TFTP filenames carry
/// no charset guarantee; they're treated as a lossy path component rather
/// than assumed UTF-8.
fn resolve_path(root: &Path, filename: &[u8]) -> Result<PathBuf> {
	let name = String::from_utf8_lossy(filename);
	let candidate = root.join(name.as_ref());
	let canonical_root = root.canonicalize().map_err(RequestError::Io)?;

	// The file may not exist yet (a WRQ target), so canonicalize only the
	// parent and re-append the final component.
	let parent = candidate.parent().unwrap_or(root);
	let canonical_parent = parent.canonicalize().map_err(|_| RequestError::PathTraversal)?;
	if !canonical_parent.starts_with(&canonical_root) {
		return Err(RequestError::PathTraversal);
	}
	let file_name = candidate.file_name().ok_or(RequestError::PathTraversal)?;
	Ok(canonical_parent.join(file_name))
}

/// Handles exactly one RRQ/WRQ from first datagram to session completion.
struct RequestHandler {
	root: PathBuf,
	config: Config,
	cancel: CancellationToken,
}

impl RequestHandler {
	fn new(root: PathBuf, config: Config, cancel: CancellationToken) -> Self {
		Self { root, config, cancel }
	}

	fn handle(&self, packet: Packet, client: SocketAddr) -> Result<()> {
		let role = match packet.kind() {
			crate::tftp::packet::PacketKind::Rrq => Role::ServerDownload,
			crate::tftp::packet::PacketKind::Wrq => Role::ServerUpload,
			_ => {
				warn!("ignoring non-request packet from {client}");
				return Err(RequestError::MalformedRequest);
			}
		};

		let mut ctx = SessionContext::new(client, role, self.config.timeout(), self.config.retries);
		ctx.tid_locked = true;

		let mut placeholder = blank_stream(role);
		let classify = transition(SessionState::Start, Event::Inbound { packet, from: client }, &mut ctx, &mut placeholder);
		if let Some(err) = classify.error {
			debug!("rejected request from {client}: {err}");
			self.send_terminal_errors(&ctx, classify.actions, client);
			return Err(RequestError::MalformedRequest);
		}

		let path = match resolve_path(&self.root, &ctx.filename) {
			Ok(p) => p,
			Err(e) => {
				let code = match e {
					RequestError::PathTraversal => ErrorCode::AccessViolation,
					_ => ErrorCode::NotDefined,
				};
				self.reply_error(client, code, e.to_string());
				return Err(e);
			}
		};

		let mut stream = match role {
			Role::ServerDownload => {
				let file = open_for_read(&path).map_err(|e| self.map_open_error(client, e))?;
				ctx.file_size = file.metadata().ok().map(|m| m.len());
				TransferStream::Reader(Box::new(FileReadStream::new(file)) as Box<dyn ReadStream>)
			}
			Role::ServerUpload => {
				let file = open_for_write(&path).map_err(|e| self.map_open_error(client, e))?;
				TransferStream::Writer(Box::new(FileWriteStream::new(file)) as Box<dyn WriteStream>)
			}
			_ => unreachable!("classify only ever yields ServerDownload/ServerUpload"),
		};

		let endpoint = match UdpEndpoint::bind(SocketAddr::new(client_local_ip(client), 0)) {
			Ok(e) => e,
			Err(e) => {
				error!("failed to bind a per-session socket for {client}: {e}");
				return Err(RequestError::Io(e));
			}
		};

		info!("{:?} {} from {}", role, String::from_utf8_lossy(&ctx.filename), client);
		let initial = match role {
			Role::ServerDownload => SessionState::ReceivedRrq,
			Role::ServerUpload => SessionState::ReceivedWrq,
			_ => unreachable!(),
		};
		match run_session(initial, &endpoint, &mut ctx, &mut stream, &self.cancel) {
			Ok(()) => {
				info!(
					"{} with {} complete: {} bytes at {:.0} B/s",
					String::from_utf8_lossy(&ctx.filename),
					client,
					ctx.metrics.bytes_transferred,
					ctx.metrics.throughput_bytes_per_sec()
				);
				Ok(())
			}
			Err(e) => {
				warn!("session with {client} failed: {e}");
				Err(RequestError::MalformedRequest)
			}
		}
	}

	fn map_open_error(&self, client: SocketAddr, e: io::Error) -> RequestError {
		let (code, err) = match e.kind() {
			io::ErrorKind::NotFound => (ErrorCode::FileNotFound, RequestError::FileNotFound),
			io::ErrorKind::PermissionDenied => (ErrorCode::AccessViolation, RequestError::FileNotAccessible),
			_ => (ErrorCode::NotDefined, RequestError::Io(e)),
		};
		self.reply_error(client, code, err.to_string());
		err
	}

	fn reply_error(&self, client: SocketAddr, code: ErrorCode, message: impl Into<String>) {
		if let Ok(endpoint) = UdpEndpoint::bind(SocketAddr::new(client_local_ip(client), 0)) {
			let packet = Packet::error(code, message);
			let _ = endpoint.send(&packet.encode(), client);
		}
	}

	fn send_terminal_errors(&self, ctx: &SessionContext, actions: Vec<crate::tftp::state_machine::Action>, client: SocketAddr) {
		use crate::tftp::state_machine::Action;
		let Ok(endpoint) = UdpEndpoint::bind(SocketAddr::new(client_local_ip(client), 0)) else { return };
		for action in actions {
			let (bytes, to) = match action {
				Action::Transmit(p) => (p.encode(), ctx.peer_address),
				Action::TransmitTo(p, to) => (p.encode(), to),
			};
			let _ = endpoint.send(&bytes, to);
		}
	}
}

fn blank_stream(role: Role) -> TransferStream {
	match role {
		Role::ServerDownload => TransferStream::Reader(Box::new(crate::tftp::stream::BufferReadStream::new(Vec::new()))),
		_ => TransferStream::Writer(Box::new(BufferWriteStream::new())),
	}
}

fn client_local_ip(client: SocketAddr) -> IpAddr {
	match client.ip() {
		IpAddr::V4(_) => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
		IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
	}
}

fn open_for_read(path: &Path) -> io::Result<std::fs::File> {
	std::fs::File::open(path)
}

fn open_for_write(path: &Path) -> io::Result<std::fs::File> {
	std::fs::OpenOptions::new().create(true).truncate(true).write(true).open(path)
}

/// The listening half: binds port 69 (or whatever the caller chooses),
/// accepts requests, and spawns one blocking task per session so a slow
/// peer never stalls another transfer.
pub struct TftpServer {
	socket: UdpSocket,
	root: PathBuf,
	config: Config,
}

impl TftpServer {
	pub fn new(listen_addr: SocketAddr, root: PathBuf, config: Config) -> io::Result<Self> {
		let socket = UdpSocket::bind(listen_addr)?;
		socket.set_read_timeout(Some(Duration::from_millis(500)))?;
		Ok(Self { socket, root, config })
	}

	/// The address actually bound, useful when `listen_addr` used port 0.
	pub fn local_addr(&self) -> SocketAddr {
		self.socket.local_addr().expect("bound socket always has a local address")
	}

	pub async fn run(&self, cancel: CancellationToken) {
		loop {
			if cancel.is_cancelled() {
				warn!("server task cancelled by signal");
				break;
			}

			let mut recv_buf = vec![0u8; 65536];
			match self.socket.recv_from(&mut recv_buf) {
				Ok((size, client)) => {
					debug!("received {size} bytes from {client}");
					let Ok(packet) = Packet::decode(&recv_buf[..size]) else {
						warn!("malformed initial packet from {client}");
						continue;
					};
					let root = self.root.clone();
					let config = self.config.clone();
					let task_cancel = cancel.clone();
					tokio::task::spawn_blocking(move || {
						let handler = RequestHandler::new(root, config, task_cancel);
						let _ = handler.handle(packet, client);
					});
				}
				Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
				Err(e) => error!("{e}"),
			}
		}
	}
}
