//! Error types shared across the codec, negotiator and state machine.

use std::net::SocketAddr;

use thiserror::Error;

/// The nine TFTP error codes defined by RFC 1350 plus RFC 2347's option
/// negotiation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
	NotDefined = 0,
	FileNotFound = 1,
	AccessViolation = 2,
	DiskFull = 3,
	IllegalOperation = 4,
	UnknownTid = 5,
	FileExists = 6,
	NoSuchUser = 7,
	OptionNegotiation = 8,
}

impl ErrorCode {
	pub fn default_message(&self) -> &'static str {
		match self {
			Self::NotDefined => "",
			Self::FileNotFound => "File not found",
			Self::AccessViolation => "Access violation",
			Self::DiskFull => "Disk full or allocation exceeded",
			Self::IllegalOperation => "Illegal TFTP operation",
			Self::UnknownTid => "Unknown transfer ID",
			Self::FileExists => "File already exists",
			Self::NoSuchUser => "No such user",
			Self::OptionNegotiation => "Option negotiation error",
		}
	}
}

impl TryFrom<u16> for ErrorCode {
	type Error = DecodeError;

	fn try_from(value: u16) -> Result<Self, Self::Error> {
		Ok(match value {
			0 => Self::NotDefined,
			1 => Self::FileNotFound,
			2 => Self::AccessViolation,
			3 => Self::DiskFull,
			4 => Self::IllegalOperation,
			5 => Self::UnknownTid,
			6 => Self::FileExists,
			7 => Self::NoSuchUser,
			8 => Self::OptionNegotiation,
			other => return Err(DecodeError::InvalidErrorCode(other)),
		})
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", *self as u16)
	}
}

/// Failures decoding a byte buffer into a [`crate::tftp::packet::Packet`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("packet shorter than the minimum opcode size")]
	TooShort,
	#[error("unknown opcode {0}")]
	UnknownOpcode(u16),
	#[error("option value must not be empty")]
	EmptyOptionValue,
	#[error("DATA payload of {0} bytes exceeds the maximum of 65464")]
	PayloadTooLarge(usize),
	#[error("ERROR packet carries invalid code {0}")]
	InvalidErrorCode(u16),
	#[error("string field is not NUL-terminated")]
	NotNulTerminated,
}

/// Failures negotiating options, distinct from wire decode failures because
/// they carry protocol-level meaning (RFC 2347's OACK rules).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionError {
	#[error("OACK contains an option the peer never requested")]
	UnrequestedOption,
	#[error("peer never sent an ACK in reply to our OACK")]
	MissingAck,
}

/// Local-only errors raised while servicing a request, before any ERROR
/// packet has necessarily been sent.
#[derive(Debug, Error)]
pub enum RequestError {
	#[error("malformed request packet")]
	MalformedRequest,
	#[error("requested file was not found")]
	FileNotFound,
	#[error("file is not accessible")]
	FileNotAccessible,
	#[error("requested transfer mode is not supported")]
	UnsupportedMode,
	#[error("requested path escapes the server root")]
	PathTraversal,
	#[error("other I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// The error surfaced to a library caller when a session reaches
/// [`crate::tftp::state_machine::SessionState::Errored`].
#[derive(Debug, Error)]
#[error("tftp session with {peer} failed: {kind}")]
pub struct TftpError {
	pub kind: TftpErrorKind,
	pub peer: SocketAddr,
}

impl TftpError {
	pub fn new(kind: TftpErrorKind, peer: SocketAddr) -> Self {
		Self { kind, peer }
	}
}

/// The reason a session ended in [`TftpErrorKind`].
#[derive(Debug, Error)]
pub enum TftpErrorKind {
	#[error("peer sent ERROR {code}: {message}")]
	PeerError { code: u16, message: String },
	#[error("local protocol violation: {0}")]
	Protocol(String),
	#[error("retransmit budget exhausted after {0} attempts")]
	TimeoutExceeded(u8),
	#[error("endpoint I/O failure: {0}")]
	Io(String),
	#[error("malformed packet from peer: {0}")]
	Decode(#[from] DecodeError),
	#[error("option negotiation failed: {0}")]
	Option(#[from] OptionError),
	#[error("session was cancelled")]
	Cancelled,
}
