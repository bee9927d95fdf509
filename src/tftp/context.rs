//! Per-session mutable state: everything the state machine reads and
//! updates while driving a single transfer.

use std::net::SocketAddr;
use std::time::Instant;

use crate::tftp::options::OptionValues;
use crate::tftp::packet::Packet;

/// Which side of which direction this session is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	/// Client downloading a file (sent RRQ).
	ClientDownload,
	/// Client uploading a file (sent WRQ).
	ClientUpload,
	/// Server serving a file out (received RRQ).
	ServerDownload,
	/// Server receiving a file (received WRQ).
	ServerUpload,
}

impl Role {
	pub fn is_client(&self) -> bool {
		matches!(self, Self::ClientDownload | Self::ClientUpload)
	}

	/// `true` if this session reads from its stream and sends DATA
	/// (the "downloader" of a download is the peer; the sender of DATA is
	/// whoever holds the file: ServerDownload and ClientUpload).
	pub fn sends_data(&self) -> bool {
		matches!(self, Self::ServerDownload | Self::ClientUpload)
	}
}

/// Throughput and packet-count bookkeeping, surfaced to the caller when a
/// session finishes.
#[derive(Debug, Clone)]
pub struct Metrics {
	pub bytes_transferred: u64,
	pub data_packets: u64,
	pub ack_packets: u64,
	pub retransmits: u32,
	pub started_at: Instant,
	pub finished_at: Option<Instant>,
}

impl Metrics {
	pub fn new() -> Self {
		Self {
			bytes_transferred: 0,
			data_packets: 0,
			ack_packets: 0,
			retransmits: 0,
			started_at: Instant::now(),
			finished_at: None,
		}
	}

	pub fn finish(&mut self) {
		self.finished_at = Some(Instant::now());
	}

	/// Average throughput in bytes/second over the session's wall-clock
	/// duration. `0.0` if the session finished in under a microsecond or
	/// hasn't finished yet.
	pub fn throughput_bytes_per_sec(&self) -> f64 {
		let Some(end) = self.finished_at else { return 0.0 };
		let elapsed = end.duration_since(self.started_at).as_secs_f64();
		if elapsed <= 0.0 {
			0.0
		} else {
			self.bytes_transferred as f64 / elapsed
		}
	}
}

impl Default for Metrics {
	fn default() -> Self {
		Self::new()
	}
}

/// Emitted to an optional [`PacketHook`] after every encode of an outbound
/// packet and after every successful decode of an inbound one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
	Outbound,
	Inbound,
}

pub struct PacketEvent<'a> {
	pub direction: PacketDirection,
	pub packet: &'a Packet,
}

/// A callback invoked around every packet this session sends or receives.
/// A panic inside the hook is caught so a misbehaving caller can never
/// take down the session.
pub type PacketHook = Box<dyn FnMut(&PacketEvent) + Send>;

pub(crate) fn invoke_hook(hook: &mut Option<PacketHook>, event: PacketEvent) {
	let Some(hook) = hook else { return };
	let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(&event)));
	if result.is_err() {
		log::warn!("packet_hook panicked; ignoring");
	}
}

/// The mutable state a [`crate::tftp::state_machine`] transition reads and
/// writes. Owned by the caller driving the event loop; the state machine
/// never owns an endpoint or stream directly, so nothing here is shared
/// across threads.
pub struct SessionContext {
	pub peer_address: SocketAddr,
	/// Set once the peer's TID is known; after that, any packet from a
	/// different port is answered with ERROR 5 and otherwise ignored.
	pub tid_locked: bool,
	pub role: Role,

	/// The file name this session is transferring. For a client this is
	/// filled in before `StartUp`; for a server it's populated from the
	/// inbound RRQ/WRQ.
	pub filename: Vec<u8>,
	/// Known size of the file being transferred, when available (a server
	/// download knows it from `stat`; an upload only knows it if the peer
	/// requested `tsize` with a nonzero value).
	pub file_size: Option<u64>,

	pub requested_options: Vec<(Vec<u8>, Vec<u8>)>,
	pub negotiated: OptionValues,
	pub blksize: u16,

	pub last_block_sent: u16,
	pub last_block_acked: u16,
	pub last_outbound_packet: Option<Packet>,

	pub timeout: std::time::Duration,
	pub retries_left: u8,
	pub max_retries: u8,

	pub metrics: Metrics,
	pub packet_hook: Option<PacketHook>,
}

impl SessionContext {
	pub fn new(peer_address: SocketAddr, role: Role, timeout: std::time::Duration, retries: u8) -> Self {
		Self {
			peer_address,
			tid_locked: false,
			role,
			filename: Vec::new(),
			file_size: None,
			requested_options: Vec::new(),
			negotiated: OptionValues::default(),
			blksize: crate::tftp::consts::DEFAULT_BLKSIZE,
			last_block_sent: 0,
			last_block_acked: 0,
			last_outbound_packet: None,
			timeout,
			retries_left: retries,
			max_retries: retries,
			metrics: Metrics::new(),
			packet_hook: None,
		}
	}

	/// The block number expected to follow `last`, with 16-bit rollover
	/// wrapping to `0` (not `1`).
	pub fn next_block(last: u16) -> u16 {
		last.wrapping_add(1)
	}

	/// Resets the retry budget on any forward-progress event, so the budget
	/// is really "N consecutive timeouts without progress" rather than a
	/// strict per-session total; see `DESIGN.md`.
	pub fn reset_retries(&mut self) {
		self.retries_left = self.max_retries;
	}

	pub fn record_sent(&mut self, packet: Packet) {
		invoke_hook(&mut self.packet_hook, PacketEvent { direction: PacketDirection::Outbound, packet: &packet });
		self.last_outbound_packet = Some(packet);
	}

	pub fn record_received(&mut self, packet: &Packet) {
		invoke_hook(&mut self.packet_hook, PacketEvent { direction: PacketDirection::Inbound, packet });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn block_rollover_wraps_to_zero() {
		assert_eq!(SessionContext::next_block(65535), 0);
		assert_eq!(SessionContext::next_block(0), 1);
	}
}
