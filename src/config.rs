//! Crate-wide configuration. Defaults mirror RFC 1350/2348/2349; every
//! field here is a value a caller can override per-session, never a
//! writable process-wide static (see `spec` design notes on global state).

use std::path::PathBuf;

use crate::tftp::consts;

#[derive(Debug, Clone)]
pub struct Config {
	/// Requested blksize (8..=65464). `None` means "don't request it".
	pub blksize: Option<u16>,
	/// Requested tsize. `Some(0)` on a download means "tell me the size";
	/// on an upload it should be the size the caller intends to send.
	pub tsize: Option<u64>,
	/// Per-packet retransmit timeout.
	pub timeout_secs: u64,
	/// Total retransmit budget for the session (see [`crate::tftp::state_machine`]
	/// for the reset-on-progress policy this crate chose).
	pub retries: u8,
	/// Server-only: the directory requests are rooted at. Path traversal
	/// outside this root is rejected with ERROR 2.
	pub tftproot: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			blksize: None,
			tsize: None,
			timeout_secs: consts::DEFAULT_TIMEOUT_SECS,
			retries: consts::DEFAULT_RETRIES,
			tftproot: None,
		}
	}
}

impl Config {
	pub fn timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.timeout_secs)
	}
}
