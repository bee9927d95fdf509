//! Drives a single transfer to completion by repeatedly calling
//! [`transition`] against a concrete [`Endpoint`] and [`TransferStream`].
//! Both the client and the server dispatcher share this loop; the only
//! difference between a client and a server session is how the
//! [`SessionContext`] and initial [`SessionState`] are constructed.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::tftp::context::SessionContext;
use crate::tftp::endpoint::{Endpoint, ReceiveOutcome};
use crate::tftp::error::TftpError;
use crate::tftp::packet::Packet;
use crate::tftp::state_machine::{transition, Action, Event, SessionState};
use crate::tftp::stream::TransferStream;

/// Runs a session to completion, blocking the calling thread. Intended to
/// be invoked inside `tokio::task::spawn_blocking` by callers that also
/// want async cancellation (see `server.rs`); a plain synchronous caller
/// (the CLI client) can just call it directly.
///
/// `initial` is the state to enter before the first event is delivered:
/// `Start` for a fresh client request, or `ReceivedRrq`/`ReceivedWrq` for a
/// server session whose dispatcher has already classified the request and
/// opened the file.
pub fn run_session(
	mut state: SessionState,
	endpoint: &dyn Endpoint,
	ctx: &mut SessionContext,
	stream: &mut TransferStream,
	cancel: &CancellationToken,
) -> Result<(), TftpError> {
	let startup = matches!(state, SessionState::Start | SessionState::ReceivedRrq | SessionState::ReceivedWrq);
	let mut event = if startup { Some(Event::StartUp) } else { None };

	loop {
		if cancel.is_cancelled() {
			let t = transition(state, Event::Cancelled, ctx, stream);
			dispatch_actions(endpoint, ctx, t.actions);
			return Err(TftpError::new(t.error.expect("Cancelled always errors"), ctx.peer_address));
		}

		let ev = match event.take() {
			Some(ev) => ev,
			None => match endpoint.receive(ctx.timeout) {
				Ok(ReceiveOutcome::Packet(bytes, from)) => match Packet::decode(&bytes) {
					Ok(packet) => Event::Inbound { packet, from },
					Err(_) => {
						// A malformed datagram from whoever sent it is not
						// addressed to us in any meaningful sense; ignore it
						// and keep waiting rather than tearing the session
						// down over noise on the wire.
						continue;
					}
				},
				Ok(ReceiveOutcome::Timeout) => Event::Timeout,
				Err(e) => {
					return Err(TftpError::new(crate::tftp::error::TftpErrorKind::Io(e.to_string()), ctx.peer_address));
				}
			},
		};

		let t = transition(state, ev, ctx, stream);
		dispatch_actions(endpoint, ctx, t.actions);
		state = t.state;

		match state {
			SessionState::Finished => return Ok(()),
			SessionState::Errored => {
				return Err(TftpError::new(
					t.error.unwrap_or_else(|| crate::tftp::error::TftpErrorKind::Protocol("session errored with no reason recorded".into())),
					ctx.peer_address,
				));
			}
			_ => {}
		}
	}
}

fn dispatch_actions(endpoint: &dyn Endpoint, ctx: &SessionContext, actions: Vec<Action>) {
	for action in actions {
		let (bytes, to) = match action {
			Action::Transmit(packet) => (packet.encode(), ctx.peer_address),
			Action::TransmitTo(packet, to) => (packet.encode(), to),
		};
		if let Err(e) = endpoint.send(&bytes, to) {
			log::warn!("failed to send packet to {to}: {e}");
		}
	}
}

/// Convenience for constructing the timeout used for a single `receive`
/// call; kept separate from `Config::timeout` so tests can shrink it.
pub fn default_receive_timeout() -> Duration {
	Duration::from_secs(crate::tftp::consts::DEFAULT_TIMEOUT_SECS)
}
