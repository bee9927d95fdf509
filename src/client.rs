//! Client-side sessions built on the protocol engine in `tftp::`. A
//! [`TftpClient`] resolves local file I/O (or stdin/stdout) into a
//! [`TransferStream`] and drives it through [`session::run_session`]
//! against a real [`UdpEndpoint`] bound to an ephemeral port.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

#[allow(unused)]
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::tftp::context::{Role, SessionContext};
use crate::tftp::endpoint::UdpEndpoint;
use crate::tftp::error::TftpError;
use crate::tftp::options::TftpOption;
use crate::tftp::session::run_session;
use crate::tftp::state_machine::SessionState;
use crate::tftp::stream::{FileReadStream, FileWriteStream, ReadStream, StdinReadStream, StdoutWriteStream, TransferStream, WriteStream};

/// A client bound to one local address, reusable across requests.
pub struct TftpClient {
	local_addr: IpAddr,
	config: Config,
}

impl TftpClient {
	pub fn new(local_addr: IpAddr, config: Config) -> Self {
		Self { local_addr, config }
	}

	/// Downloads `remote_file` from `server` into `dest` (or, if `dest` is
	/// `None`, to stdout). Returns the session's metrics on success.
	pub fn download(&self, server: SocketAddr, remote_file: &[u8], dest: Option<&Path>, cancel: &CancellationToken) -> Result<crate::tftp::context::Metrics, TftpError> {
		let stream = match dest {
			Some(path) => {
				let file = std::fs::OpenOptions::new()
					.create(true)
					.write(true)
					.truncate(true)
					.open(path)
					.map_err(|e| TftpError::new(crate::tftp::error::TftpErrorKind::Io(e.to_string()), server))?;
				TransferStream::Writer(Box::new(FileWriteStream::new(file)) as Box<dyn WriteStream>)
			}
			None => TransferStream::Writer(Box::new(StdoutWriteStream::new())),
		};
		self.run(server, remote_file, Role::ClientDownload, stream, cancel)
	}

	/// Uploads `src` (or, if `src` is `None`, stdin) to `server` under
	/// `remote_file`.
	pub fn upload(&self, server: SocketAddr, remote_file: &[u8], src: Option<&Path>, cancel: &CancellationToken) -> Result<crate::tftp::context::Metrics, TftpError> {
		let (stream, size) = match src {
			Some(path) => {
				let file = std::fs::File::open(path).map_err(|e| TftpError::new(crate::tftp::error::TftpErrorKind::Io(e.to_string()), server))?;
				let size = file.metadata().ok().map(|m| m.len());
				(TransferStream::Reader(Box::new(FileReadStream::new(file)) as Box<dyn ReadStream>), size)
			}
			None => (TransferStream::Reader(Box::new(StdinReadStream::new())), None),
		};
		let mut config = self.config.clone();
		if config.tsize.is_some() {
			config.tsize = size.or(config.tsize);
		}
		self.run_with_config(server, remote_file, Role::ClientUpload, stream, &config, cancel)
	}

	fn run(&self, server: SocketAddr, remote_file: &[u8], role: Role, stream: TransferStream, cancel: &CancellationToken) -> Result<crate::tftp::context::Metrics, TftpError> {
		self.run_with_config(server, remote_file, role, stream, &self.config, cancel)
	}

	fn run_with_config(
		&self,
		server: SocketAddr,
		remote_file: &[u8],
		role: Role,
		mut stream: TransferStream,
		config: &Config,
		cancel: &CancellationToken,
	) -> Result<crate::tftp::context::Metrics, TftpError> {
		let endpoint = UdpEndpoint::bind(SocketAddr::new(self.local_addr, 0))
			.map_err(|e| TftpError::new(crate::tftp::error::TftpErrorKind::Io(e.to_string()), server))?;

		let mut ctx = SessionContext::new(server, role, config.timeout(), config.retries);
		ctx.filename = remote_file.to_vec();
		ctx.requested_options = requested_options(config).iter().map(TftpOption::to_pair).collect();

		info!("{:?} {} with {}", role, String::from_utf8_lossy(remote_file), server);
		let result = run_session(SessionState::Start, &endpoint, &mut ctx, &mut stream, cancel);
		match &result {
			Ok(()) => info!(
				"transfer with {} complete: {} bytes at {:.0} B/s",
				server,
				ctx.metrics.bytes_transferred,
				ctx.metrics.throughput_bytes_per_sec()
			),
			Err(e) => warn!("transfer with {} failed: {}", server, e),
		}
		result.map(|()| ctx.metrics)
	}
}

fn requested_options(config: &Config) -> Vec<TftpOption> {
	let mut opts = Vec::with_capacity(2);
	if let Some(blksize) = config.blksize {
		opts.push(TftpOption::Blksize(blksize));
	}
	if let Some(tsize) = config.tsize {
		opts.push(TftpOption::Tsize(tsize));
	}
	opts
}
