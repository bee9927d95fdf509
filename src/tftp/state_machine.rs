//! The session state machine: a single dispatcher function taking
//! `(state, event, context)` and returning the next state plus any packets
//! to transmit. States are data (a tagged enum), not objects, so the
//! transition table stays in one auditable place instead of being spread
//! across per-state handler types.

use std::net::SocketAddr;

use crate::tftp::consts;
use crate::tftp::context::{Role, SessionContext};
use crate::tftp::error::{ErrorCode, TftpErrorKind};
use crate::tftp::options::{self, OptionValues};
use crate::tftp::packet::{OptionPair, Packet, PacketKind};
use crate::tftp::stream::TransferStream;

/// Opcode-level classification of a request, independent of direction
/// (RRQ from a client is a download for the client but the server calls it
/// serving a read; WRQ is the mirror).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
	Rrq,
	Wrq,
}

impl Role {
	fn request_kind(self) -> RequestKind {
		match self {
			Role::ClientDownload | Role::ServerDownload => RequestKind::Rrq,
			Role::ClientUpload | Role::ServerUpload => RequestKind::Wrq,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
	Start,
	SentRrq,
	SentWrq,
	ReceivedRrq,
	ReceivedWrq,
	ExpectData,
	ExpectAck,
	Finished,
	Errored,
}

/// The event-driven inputs the state machine reacts to.
pub enum Event {
	StartUp,
	Inbound { packet: Packet, from: SocketAddr },
	Timeout,
	Cancelled,
}

/// A side effect the driver (see `tftp::session`) must carry out. Keeping
/// this separate from `SessionContext` mutation is what lets `transition`
/// stay a plain function instead of needing a live `Endpoint` handle.
pub enum Action {
	/// Send to `ctx.peer_address`; already recorded as the session's
	/// `last_outbound_packet`.
	Transmit(Packet),
	/// Send to an address that is *not* this session's peer (stray-TID
	/// replies); never affects session state.
	TransmitTo(Packet, SocketAddr),
}

/// Outcome of driving one event through the machine: the next state, the
/// error that caused it if terminal-failure, and any packets to send.
pub struct Transition {
	pub state: SessionState,
	pub error: Option<TftpErrorKind>,
	pub actions: Vec<Action>,
}

impl Transition {
	fn ok(state: SessionState, actions: Vec<Action>) -> Self {
		Self { state, error: None, actions }
	}

	fn errored(error: TftpErrorKind, actions: Vec<Action>) -> Self {
		Self { state: SessionState::Errored, error: Some(error), actions }
	}

	/// Alias for [`Transition::ok`] used at call sites where the state
	/// genuinely doesn't change, for readability.
	fn unchanged(state: SessionState, actions: Vec<Action>) -> Self {
		Self::ok(state, actions)
	}
}

fn send_error(ctx: &mut SessionContext, code: ErrorCode, message: impl Into<String>) -> Vec<Action> {
	let message = message.into();
	let packet = Packet::error(code, message.clone());
	ctx.record_sent(packet.clone());
	vec![Action::Transmit(packet)]
}

/// Parses the raw request fields shared by RRQ/WRQ. Returns `None` if the
/// packet isn't actually a request (caller already knows it is when this
/// is invoked, from `packet.kind()`).
fn request_fields(packet: &Packet) -> Option<(&[u8], &[u8], &[OptionPair])> {
	match packet {
		Packet::Rrq { filename, mode, options } | Packet::Wrq { filename, mode, options } => {
			Some((filename, mode, options))
		}
		_ => None,
	}
}

fn is_octet_mode(mode: &[u8]) -> bool {
	mode.eq_ignore_ascii_case(consts::MODE_OCTET)
}

fn last_sent_payload_len(ctx: &SessionContext) -> usize {
	match &ctx.last_outbound_packet {
		Some(Packet::Data { payload, .. }) => payload.len(),
		_ => 0,
	}
}

/// The single dispatcher function driving a session:
/// `(state, event, context) -> (state, actions)`, with stream reads/writes
/// folded in directly since they're synchronous and bounded to one block.
pub fn transition(state: SessionState, event: Event, ctx: &mut SessionContext, stream: &mut TransferStream) -> Transition {
	// Before the TID is locked we still insist on the same IP we started
	// talking to; once locked, any other source port is answered with
	// ERROR 5 and otherwise ignored.
	if let Event::Inbound { ref packet, from } = event {
		ctx.record_received(packet);
		if ctx.tid_locked {
			if from != ctx.peer_address {
				let err = Packet::error(ErrorCode::UnknownTid, ErrorCode::UnknownTid.default_message());
				return Transition::unchanged(state, vec![Action::TransmitTo(err, from)]);
			}
		} else if from.ip() != ctx.peer_address.ip() {
			let err = Packet::error(ErrorCode::UnknownTid, ErrorCode::UnknownTid.default_message());
			return Transition::unchanged(state, vec![Action::TransmitTo(err, from)]);
		} else {
			ctx.peer_address = from;
			ctx.tid_locked = true;
		}
	}

	if let Event::Cancelled = event {
		let packet = Packet::error(ErrorCode::NotDefined, "Cancelled");
		ctx.record_sent(packet.clone());
		return Transition::errored(TftpErrorKind::Cancelled, vec![Action::Transmit(packet)]);
	}

	// A received ERROR packet is terminal in every awaiting state; no reply.
	if let Event::Inbound { packet: Packet::Error { code, ref message }, .. } = event {
		return Transition::errored(
			TftpErrorKind::PeerError { code, message: String::from_utf8_lossy(message).into_owned() },
			vec![],
		);
	}

	match (state, event) {
		(SessionState::Start, Event::StartUp) => client_send_request(ctx),

		(SessionState::Start, Event::Inbound { packet, .. }) => server_classify_request(ctx, packet),

		(SessionState::ReceivedRrq, Event::StartUp) | (SessionState::ReceivedWrq, Event::StartUp) => {
			server_begin_transfer(ctx, stream)
		}

		(SessionState::SentRrq, Event::Inbound { packet: Packet::Oack { options }, .. }) => {
			client_accept_oack(ctx, options, RequestKind::Rrq, stream)
		}
		(SessionState::SentRrq, Event::Inbound { packet: Packet::Data { block, payload }, .. }) => {
			client_options_declined_first_data(ctx, block, payload, stream)
		}

		(SessionState::SentWrq, Event::Inbound { packet: Packet::Oack { options }, .. }) => {
			client_accept_oack(ctx, options, RequestKind::Wrq, stream)
		}
		(SessionState::SentWrq, Event::Inbound { packet: Packet::Ack { block: 0 }, .. }) => {
			client_options_declined_send_first(ctx, stream)
		}

		(SessionState::ExpectData, Event::Inbound { packet: Packet::Data { block, payload }, .. }) => {
			receive_data(ctx, block, payload, stream)
		}
		(SessionState::ExpectAck, Event::Inbound { packet: Packet::Ack { block }, .. }) => receive_ack(ctx, block, stream),

		(s @ (SessionState::SentRrq
		| SessionState::SentWrq
		| SessionState::ExpectData
		| SessionState::ExpectAck), Event::Timeout) => on_timeout(ctx, s),

		(s, _) => {
			let actions = send_error(ctx, ErrorCode::IllegalOperation, "unexpected packet for current session state");
			Transition::errored(TftpErrorKind::Protocol(format!("unexpected event in state {s:?}")), actions)
		}
	}
}

fn client_send_request(ctx: &mut SessionContext) -> Transition {
	let (filename, options) = (ctx.filename.clone(), ctx.requested_options.clone());
	let packet = match ctx.role.request_kind() {
		RequestKind::Rrq => Packet::Rrq { filename, mode: consts::MODE_OCTET.to_vec(), options },
		RequestKind::Wrq => Packet::Wrq { filename, mode: consts::MODE_OCTET.to_vec(), options },
	};
	ctx.record_sent(packet.clone());
	let next = match ctx.role.request_kind() {
		RequestKind::Rrq => SessionState::SentRrq,
		RequestKind::Wrq => SessionState::SentWrq,
	};
	Transition::ok(next, vec![Action::Transmit(packet)])
}

fn server_classify_request(ctx: &mut SessionContext, packet: Packet) -> Transition {
	let Some((filename, mode, options)) = request_fields(&packet) else {
		let actions = send_error(ctx, ErrorCode::IllegalOperation, "expected RRQ or WRQ");
		return Transition::errored(TftpErrorKind::Protocol("first packet was not a request".into()), actions);
	};
	if !is_octet_mode(mode) {
		let actions = send_error(ctx, ErrorCode::IllegalOperation, "only octet mode is supported");
		return Transition::errored(TftpErrorKind::Protocol("unsupported transfer mode".into()), actions);
	}
	ctx.filename = filename.to_vec();
	ctx.requested_options = options.to_vec();
	let next = match packet.kind() {
		PacketKind::Rrq => SessionState::ReceivedRrq,
		PacketKind::Wrq => SessionState::ReceivedWrq,
		_ => unreachable!("request_fields only matches Rrq/Wrq"),
	};
	Transition::ok(next, vec![])
}

fn apply_negotiated(ctx: &mut SessionContext, values: OptionValues) {
	ctx.negotiated = values;
	if let Some(blksize) = values.blksize {
		ctx.blksize = blksize;
	}
}

fn server_begin_transfer(ctx: &mut SessionContext, stream: &mut TransferStream) -> Transition {
	let (echoed, values) = options::negotiate_server(&ctx.requested_options, ctx.role, ctx.file_size);
	if !echoed.is_empty() {
		apply_negotiated(ctx, values);
		let oack = Packet::Oack { options: echoed };
		ctx.record_sent(oack.clone());
		let next = match ctx.role {
			Role::ServerDownload => {
				ctx.last_block_sent = 0;
				SessionState::ExpectAck
			}
			Role::ServerUpload => {
				ctx.last_block_acked = 0;
				SessionState::ExpectData
			}
			_ => unreachable!(),
		};
		return Transition::ok(next, vec![Action::Transmit(oack)]);
	}

	// RFC 1350 fallback: no options understood, proceed at the default blksize.
	ctx.blksize = consts::DEFAULT_BLKSIZE;
	match ctx.role {
		Role::ServerDownload => send_first_data_block(ctx, stream, 1),
		Role::ServerUpload => {
			ctx.last_block_acked = 0;
			let ack = Packet::Ack { block: 0 };
			ctx.record_sent(ack.clone());
			Transition::ok(SessionState::ExpectData, vec![Action::Transmit(ack)])
		}
		_ => unreachable!(),
	}
}

fn send_first_data_block(ctx: &mut SessionContext, stream: &mut TransferStream, block: u16) -> Transition {
	match stream.read_block(ctx.blksize as usize) {
		Ok(payload) => {
			ctx.last_block_sent = block;
			ctx.metrics.bytes_transferred += payload.len() as u64;
			ctx.metrics.data_packets += 1;
			let data = Packet::Data { block, payload };
			ctx.record_sent(data.clone());
			Transition::ok(SessionState::ExpectAck, vec![Action::Transmit(data)])
		}
		Err(e) => {
			let actions = send_error(ctx, ErrorCode::NotDefined, e.to_string());
			Transition::errored(TftpErrorKind::Io(e.to_string()), actions)
		}
	}
}

fn client_accept_oack(ctx: &mut SessionContext, options: Vec<OptionPair>, kind: RequestKind, stream: &mut TransferStream) -> Transition {
	if !options::is_subset_of(&options, &ctx.requested_options) {
		let actions = send_error(ctx, ErrorCode::OptionNegotiation, "OACK offered options we never requested");
		return Transition::errored(TftpErrorKind::Option(crate::tftp::error::OptionError::UnrequestedOption), actions);
	}
	let values = options::parse(&options);
	apply_negotiated(ctx, values);
	ctx.reset_retries();

	match kind {
		RequestKind::Rrq => {
			ctx.last_block_acked = 0;
			let ack = Packet::Ack { block: 0 };
			ctx.record_sent(ack.clone());
			Transition::ok(SessionState::ExpectData, vec![Action::Transmit(ack)])
		}
		RequestKind::Wrq => send_first_data_block(ctx, stream, 1),
	}
}

fn client_options_declined_first_data(ctx: &mut SessionContext, block: u16, payload: Vec<u8>, stream: &mut TransferStream) -> Transition {
	if block != 1 {
		let actions = send_error(ctx, ErrorCode::IllegalOperation, "expected first DATA block");
		return Transition::errored(TftpErrorKind::Protocol("server sent non-initial block with no OACK".into()), actions);
	}
	// The server ignored every requested option; fall back to the default.
	ctx.negotiated = OptionValues::default();
	ctx.blksize = consts::DEFAULT_BLKSIZE;
	ctx.reset_retries();
	write_data_and_ack(ctx, block, payload, stream)
}

fn client_options_declined_send_first(ctx: &mut SessionContext, stream: &mut TransferStream) -> Transition {
	ctx.negotiated = OptionValues::default();
	ctx.blksize = consts::DEFAULT_BLKSIZE;
	ctx.reset_retries();
	send_first_data_block(ctx, stream, 1)
}

fn receive_data(ctx: &mut SessionContext, block: u16, payload: Vec<u8>, stream: &mut TransferStream) -> Transition {
	let expected = SessionContext::next_block(ctx.last_block_acked);
	if block == expected {
		ctx.reset_retries();
		write_data_and_ack(ctx, block, payload, stream)
	} else if block == ctx.last_block_acked {
		// Duplicate: peer missed our ACK. Resend it without advancing or
		// touching the retry budget.
		let ack = Packet::Ack { block };
		ctx.record_sent(ack.clone());
		Transition::unchanged(SessionState::ExpectData, vec![Action::Transmit(ack)])
	} else {
		let actions = send_error(ctx, ErrorCode::IllegalOperation, "unexpected block number");
        Transition::errored(TftpErrorKind::Protocol(format!("expected block {expected}, got {block}")), actions)
	}
}

fn write_data_and_ack(ctx: &mut SessionContext, block: u16, payload: Vec<u8>, stream: &mut TransferStream) -> Transition {
	let blksize = ctx.blksize as usize;
	let is_final = payload.len() < blksize;
	if let Err(e) = stream.write_block(&payload) {
		let actions = send_error(ctx, ErrorCode::DiskFull, e.to_string());
		return Transition::errored(TftpErrorKind::Io(e.to_string()), actions);
	}
	// A final block's close/flush can still fail (e.g. disk fills on the
	// last write); that must fail the session the same way a mid-transfer
	// write error does, not report success with a truncated file on disk.
	if is_final {
		if let Err(e) = stream.close() {
			let actions = send_error(ctx, ErrorCode::DiskFull, e.to_string());
			return Transition::errored(TftpErrorKind::Io(e.to_string()), actions);
		}
	}
	ctx.metrics.bytes_transferred += payload.len() as u64;
	ctx.metrics.data_packets += 1;
	ctx.last_block_acked = block;
	let ack = Packet::Ack { block };
	ctx.record_sent(ack.clone());
	ctx.metrics.ack_packets += 1;

	if is_final {
		ctx.metrics.finish();
		Transition::ok(SessionState::Finished, vec![Action::Transmit(ack)])
	} else {
		Transition::ok(SessionState::ExpectData, vec![Action::Transmit(ack)])
	}
}

fn receive_ack(ctx: &mut SessionContext, block: u16, stream: &mut TransferStream) -> Transition {
	if block == ctx.last_block_sent {
		ctx.reset_retries();
		if last_sent_payload_len(ctx) < ctx.blksize as usize {
			ctx.metrics.finish();
			return Transition::ok(SessionState::Finished, vec![]);
		}
		let next_block = SessionContext::next_block(ctx.last_block_sent);
		match stream.read_block(ctx.blksize as usize) {
			Ok(payload) => {
				ctx.last_block_sent = next_block;
				ctx.metrics.bytes_transferred += payload.len() as u64;
				ctx.metrics.data_packets += 1;
				let data = Packet::Data { block: next_block, payload };
				ctx.record_sent(data.clone());
				Transition::ok(SessionState::ExpectAck, vec![Action::Transmit(data)])
			}
			Err(e) => {
				let actions = send_error(ctx, ErrorCode::NotDefined, e.to_string());
				Transition::errored(TftpErrorKind::Io(e.to_string()), actions)
			}
		}
	} else if block == ctx.last_block_sent.wrapping_sub(1) {
		// Duplicate ACK for the previous block; resend what we already sent.
		let packet = ctx.last_outbound_packet.clone().expect("an outbound packet precedes ExpectAck");
		ctx.record_sent(packet.clone());
		Transition::unchanged(SessionState::ExpectAck, vec![Action::Transmit(packet)])
	} else {
		let actions = send_error(ctx, ErrorCode::IllegalOperation, "unexpected ACK block number");
		Transition::errored(TftpErrorKind::Protocol(format!("unexpected ACK for block {block}")), actions)
	}
}

fn on_timeout(ctx: &mut SessionContext, state: SessionState) -> Transition {
	if ctx.retries_left > 0 {
		ctx.retries_left -= 1;
		ctx.metrics.retransmits += 1;
		let packet = ctx.last_outbound_packet.clone().expect("a packet was sent before any awaiting state");
		Transition::unchanged(state, vec![Action::Transmit(packet)])
	} else {
		Transition {
			state: SessionState::Errored,
			error: Some(TftpErrorKind::TimeoutExceeded(ctx.max_retries)),
			actions: vec![],
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tftp::stream::BufferWriteStream;
	use std::net::{IpAddr, Ipv4Addr};

	fn addr(port: u16) -> SocketAddr {
		SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
	}

	#[test]
	fn stray_tid_does_not_mutate_state() {
		let mut ctx = SessionContext::new(addr(69), Role::ServerUpload, std::time::Duration::from_secs(1), 3);
		ctx.tid_locked = true;
		ctx.peer_address = addr(1069);
		let mut stream = TransferStream::Writer(Box::new(BufferWriteStream::new()));

		let t = transition(
			SessionState::ExpectData,
			Event::Inbound { packet: Packet::Ack { block: 0 }, from: addr(9999) },
			&mut ctx,
			&mut stream,
		);
		assert_eq!(t.state, SessionState::ExpectData);
		assert_eq!(ctx.peer_address, addr(1069));
		match &t.actions[..] {
			[Action::TransmitTo(Packet::Error { code, .. }, to)] => {
				assert_eq!(*code, ErrorCode::UnknownTid as u16);
				assert_eq!(*to, addr(9999));
			}
			other => panic!("unexpected actions: {}", other.len()),
		}
	}

	#[test]
	fn duplicate_data_is_reacked_without_consuming_retries() {
		let mut ctx = SessionContext::new(addr(1069), Role::ServerUpload, std::time::Duration::from_secs(1), 3);
		ctx.tid_locked = true;
		ctx.last_block_acked = 1;
		ctx.retries_left = 3;
		let mut stream = TransferStream::Writer(Box::new(BufferWriteStream::new()));

		let t = transition(
			SessionState::ExpectData,
			Event::Inbound { packet: Packet::Data { block: 1, payload: vec![1, 2, 3] }, from: addr(1069) },
			&mut ctx,
			&mut stream,
		);
		assert_eq!(t.state, SessionState::ExpectData);
		assert_eq!(ctx.retries_left, 3);
	}

	#[test]
	fn timeout_exhausts_retry_budget() {
		let mut ctx = SessionContext::new(addr(1069), Role::ServerUpload, std::time::Duration::from_secs(1), 1);
		ctx.last_outbound_packet = Some(Packet::Ack { block: 0 });
		ctx.retries_left = 1;
		let mut stream = TransferStream::Writer(Box::new(BufferWriteStream::new()));

		let t = transition(SessionState::ExpectData, Event::Timeout, &mut ctx, &mut stream);
		assert_eq!(t.state, SessionState::ExpectData);
		assert_eq!(ctx.retries_left, 0);

		let t = transition(SessionState::ExpectData, Event::Timeout, &mut ctx, &mut stream);
		assert_eq!(t.state, SessionState::Errored);
		assert!(matches!(t.error, Some(TftpErrorKind::TimeoutExceeded(1))));
	}

	#[test]
	fn short_final_block_finishes_transfer() {
		let mut ctx = SessionContext::new(addr(1069), Role::ServerUpload, std::time::Duration::from_secs(1), 3);
		ctx.tid_locked = true;
		ctx.blksize = 512;
		ctx.last_block_acked = 0;
		let mut stream = TransferStream::Writer(Box::new(BufferWriteStream::new()));

		let t = transition(
			SessionState::ExpectData,
			Event::Inbound { packet: Packet::Data { block: 1, payload: vec![0; 88] }, from: addr(1069) },
			&mut ctx,
			&mut stream,
		);
		assert_eq!(t.state, SessionState::Finished);
	}

	#[test]
	fn client_download_falls_back_when_server_ignores_options() {
		let mut ctx = SessionContext::new(addr(69), Role::ClientDownload, std::time::Duration::from_secs(1), 3);
		ctx.requested_options = vec![(b"blksize".to_vec(), b"8192".to_vec())];
		ctx.blksize = 8192;
		let mut stream = TransferStream::Writer(Box::new(BufferWriteStream::new()));

		let t = transition(
			SessionState::SentRrq,
			Event::Inbound { packet: Packet::Data { block: 1, payload: vec![0; 512] }, from: addr(69) },
			&mut ctx,
			&mut stream,
		);
		assert_eq!(t.state, SessionState::ExpectData);
		assert_eq!(ctx.blksize, consts::DEFAULT_BLKSIZE);
		assert_eq!(ctx.negotiated, OptionValues::default());
	}

	#[test]
	fn client_upload_falls_back_when_server_ignores_options() {
		let mut ctx = SessionContext::new(addr(69), Role::ClientUpload, std::time::Duration::from_secs(1), 3);
		ctx.requested_options = vec![(b"blksize".to_vec(), b"8192".to_vec())];
		ctx.blksize = 8192;
		let mut stream = TransferStream::Reader(Box::new(crate::tftp::stream::BufferReadStream::new(vec![1, 2, 3])));

		let t = transition(
			SessionState::SentWrq,
			Event::Inbound { packet: Packet::Ack { block: 0 }, from: addr(69) },
			&mut ctx,
			&mut stream,
		);
		assert_eq!(t.state, SessionState::ExpectAck);
		assert_eq!(ctx.blksize, consts::DEFAULT_BLKSIZE);
		match &t.actions[..] {
			[Action::Transmit(Packet::Data { block: 1, payload })] => assert_eq!(payload, &vec![1, 2, 3]),
			other => panic!("unexpected actions: {}", other.len()),
		}
	}
}
