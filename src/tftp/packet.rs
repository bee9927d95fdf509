//! The six-variant TFTP wire format (RFC 1350 §5, RFC 2347 §2).
//!
//! `encode` is total over well-formed [`Packet`] values; `decode` is
//! partial over byte buffers and reports [`DecodeError`] for anything
//! malformed.

use crate::tftp::consts;
use crate::tftp::error::{DecodeError, ErrorCode};

/// An option name/value pair as it appears on the wire, preserving the
/// case the peer sent (RFC 2347 requires names be compared
/// case-insensitively but doesn't mandate any canonical case on the wire).
pub type OptionPair = (Vec<u8>, Vec<u8>);

/// The maximum DATA payload this codec will ever accept (the largest legal
/// negotiated blksize).
pub const MAX_PAYLOAD: usize = 65464;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
	Rrq {
		filename: Vec<u8>,
		mode: Vec<u8>,
		options: Vec<OptionPair>,
	},
	Wrq {
		filename: Vec<u8>,
		mode: Vec<u8>,
		options: Vec<OptionPair>,
	},
	Data {
		block: u16,
		payload: Vec<u8>,
	},
	Ack {
		block: u16,
	},
	Error {
		code: u16,
		message: Vec<u8>,
	},
	Oack {
		options: Vec<OptionPair>,
	},
}

/// Coarse classification used by the state machine to match on "what kind
/// of packet did we get" without destructuring the full payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
	Rrq,
	Wrq,
	Data,
	Ack,
	Error,
	Oack,
}

impl Packet {
	pub fn kind(&self) -> PacketKind {
		match self {
			Self::Rrq { .. } => PacketKind::Rrq,
			Self::Wrq { .. } => PacketKind::Wrq,
			Self::Data { .. } => PacketKind::Data,
			Self::Ack { .. } => PacketKind::Ack,
			Self::Error { .. } => PacketKind::Error,
			Self::Oack { .. } => PacketKind::Oack,
		}
	}

	pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
		Self::Error {
			code: code as u16,
			message: message.into().into_bytes(),
		}
	}

	/// Encodes this packet to its wire representation. Total over every
	/// value a caller can construct; a DATA payload longer than
	/// [`MAX_PAYLOAD`] is a caller bug, not a recoverable condition, so it
	/// is asserted rather than threaded through a `Result`.
	pub fn encode(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(64);
		match self {
			Self::Rrq { filename, mode, options } => {
				buf.extend_from_slice(&consts::OPCODE_RRQ.to_be_bytes());
				write_req_body(&mut buf, filename, mode, options);
			}
			Self::Wrq { filename, mode, options } => {
				buf.extend_from_slice(&consts::OPCODE_WRQ.to_be_bytes());
				write_req_body(&mut buf, filename, mode, options);
			}
			Self::Data { block, payload } => {
				assert!(payload.len() <= MAX_PAYLOAD, "DATA payload exceeds negotiated maximum");
				buf.extend_from_slice(&consts::OPCODE_DATA.to_be_bytes());
				buf.extend_from_slice(&block.to_be_bytes());
				buf.extend_from_slice(payload);
			}
			Self::Ack { block } => {
				buf.extend_from_slice(&consts::OPCODE_ACK.to_be_bytes());
				buf.extend_from_slice(&block.to_be_bytes());
			}
			Self::Error { code, message } => {
				buf.extend_from_slice(&consts::OPCODE_ERROR.to_be_bytes());
				buf.extend_from_slice(&code.to_be_bytes());
				buf.extend_from_slice(message);
				buf.push(0);
			}
			Self::Oack { options } => {
				buf.extend_from_slice(&consts::OPCODE_OACK.to_be_bytes());
				write_options(&mut buf, options);
			}
		}
		buf
	}

	/// Decodes a datagram payload into a [`Packet`]. See module docs for
	/// the exact failure conditions.
	pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
		if buf.len() < 2 {
			return Err(DecodeError::TooShort);
		}
		let opcode = u16::from_be_bytes([buf[0], buf[1]]);
		match opcode {
			consts::OPCODE_RRQ | consts::OPCODE_WRQ => {
				let (filename, mode, options) = read_req_body(&buf[2..])?;
				Ok(if opcode == consts::OPCODE_RRQ {
					Self::Rrq { filename, mode, options }
				} else {
					Self::Wrq { filename, mode, options }
				})
			}
			consts::OPCODE_DATA => {
				if buf.len() < 4 {
					return Err(DecodeError::TooShort);
				}
				let block = u16::from_be_bytes([buf[2], buf[3]]);
				let payload = buf[4..].to_vec();
				if payload.len() > MAX_PAYLOAD {
					return Err(DecodeError::PayloadTooLarge(payload.len()));
				}
				Ok(Self::Data { block, payload })
			}
			consts::OPCODE_ACK => {
				if buf.len() < 4 {
					return Err(DecodeError::TooShort);
				}
				Ok(Self::Ack { block: u16::from_be_bytes([buf[2], buf[3]]) })
			}
			consts::OPCODE_ERROR => {
				if buf.len() < 4 {
					return Err(DecodeError::TooShort);
				}
				let code = u16::from_be_bytes([buf[2], buf[3]]);
				// ensure the code is one of the nine legal codes (0..=8)
				let _ = ErrorCode::try_from(code)?;
				let message = read_nul_terminated(&buf[4..])?.to_vec();
				Ok(Self::Error { code, message })
			}
			consts::OPCODE_OACK => {
				let options = read_options(&buf[2..])?;
				Ok(Self::Oack { options })
			}
			other => Err(DecodeError::UnknownOpcode(other)),
		}
	}
}

fn write_req_body(buf: &mut Vec<u8>, filename: &[u8], mode: &[u8], options: &[OptionPair]) {
	buf.extend_from_slice(filename);
	buf.push(0);
	buf.extend_from_slice(mode);
	buf.push(0);
	write_options(buf, options);
}

fn write_options(buf: &mut Vec<u8>, options: &[OptionPair]) {
	for (name, value) in options {
		buf.extend_from_slice(name);
		buf.push(0);
		buf.extend_from_slice(value);
		buf.push(0);
	}
}

fn read_nul_terminated(buf: &[u8]) -> Result<&[u8], DecodeError> {
	let pos = buf.iter().position(|&b| b == 0).ok_or(DecodeError::NotNulTerminated)?;
	Ok(&buf[..pos])
}

fn read_req_body(buf: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<OptionPair>), DecodeError> {
	let filename = read_nul_terminated(buf)?;
	let rest = &buf[filename.len() + 1..];
	let mode = read_nul_terminated(rest)?;
	let after_mode = &rest[mode.len() + 1..];
	let options = read_options(after_mode)?;
	Ok((filename.to_vec(), mode.to_vec(), options))
}

/// Parses a sequence of NUL-terminated `name, value` pairs until the
/// buffer is exhausted. Duplicate names: last occurrence wins (handled by
/// the caller via the ordered `Vec`, which the negotiator collapses with a
/// last-wins lookup).
fn read_options(mut buf: &[u8]) -> Result<Vec<OptionPair>, DecodeError> {
	let mut options = Vec::new();
	while !buf.is_empty() {
		let name = read_nul_terminated(buf)?;
		buf = &buf[name.len() + 1..];
		let value = read_nul_terminated(buf)?;
		buf = &buf[value.len() + 1..];
		if value.is_empty() {
			return Err(DecodeError::EmptyOptionValue);
		}
		options.push((name.to_vec(), value.to_vec()));
	}
	Ok(options)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn opt(name: &str, value: &str) -> OptionPair {
		(name.as_bytes().to_vec(), value.as_bytes().to_vec())
	}

	#[test]
	fn round_trip_rrq_no_options() {
		let p = Packet::Rrq {
			filename: b"foo.txt".to_vec(),
			mode: b"octet".to_vec(),
			options: vec![],
		};
		let bytes = p.encode();
		assert_eq!(Packet::decode(&bytes).unwrap(), p);
	}

	#[test]
	fn round_trip_wrq_with_options() {
		let p = Packet::Wrq {
			filename: b"bar".to_vec(),
			mode: b"octet".to_vec(),
			options: vec![opt("blksize", "1024"), opt("tsize", "0")],
		};
		let bytes = p.encode();
		assert_eq!(Packet::decode(&bytes).unwrap(), p);
	}

	#[test]
	fn round_trip_data() {
		let p = Packet::Data { block: 42, payload: vec![1, 2, 3, 4, 5] };
		assert_eq!(Packet::decode(&p.encode()).unwrap(), p);
	}

	#[test]
	fn round_trip_data_empty_payload() {
		let p = Packet::Data { block: 0, payload: vec![] };
		assert_eq!(Packet::decode(&p.encode()).unwrap(), p);
	}

	#[test]
	fn round_trip_ack() {
		let p = Packet::Ack { block: 65535 };
		assert_eq!(Packet::decode(&p.encode()).unwrap(), p);
	}

	#[test]
	fn round_trip_error() {
		let p = Packet::error(ErrorCode::FileNotFound, "nope");
		assert_eq!(Packet::decode(&p.encode()).unwrap(), p);
	}

	#[test]
	fn round_trip_oack() {
		let p = Packet::Oack { options: vec![opt("blksize", "1428")] };
		assert_eq!(Packet::decode(&p.encode()).unwrap(), p);
	}

	#[test]
	fn decode_rejects_short_buffer() {
		assert_eq!(Packet::decode(&[0]), Err(DecodeError::TooShort));
	}

	#[test]
	fn decode_rejects_unknown_opcode() {
		assert_eq!(Packet::decode(&[0, 99]), Err(DecodeError::UnknownOpcode(99)));
	}

	#[test]
	fn decode_rejects_missing_nul_terminator() {
		let mut bytes = consts::OPCODE_RRQ.to_be_bytes().to_vec();
		bytes.extend_from_slice(b"foo.txt");
		assert_eq!(Packet::decode(&bytes), Err(DecodeError::NotNulTerminated));
	}

	#[test]
	fn decode_rejects_empty_option_value() {
		let mut bytes = consts::OPCODE_RRQ.to_be_bytes().to_vec();
		bytes.extend_from_slice(b"foo.txt\0octet\0blksize\0\0");
		assert_eq!(Packet::decode(&bytes), Err(DecodeError::EmptyOptionValue));
	}

	#[test]
	fn decode_rejects_data_payload_too_large() {
		let mut bytes = consts::OPCODE_DATA.to_be_bytes().to_vec();
		bytes.extend_from_slice(&1u16.to_be_bytes());
		bytes.extend(std::iter::repeat(0u8).take(MAX_PAYLOAD + 1));
		assert_eq!(Packet::decode(&bytes), Err(DecodeError::PayloadTooLarge(MAX_PAYLOAD + 1)));
	}

	#[test]
	fn decode_rejects_error_code_above_seven() {
		let mut bytes = consts::OPCODE_ERROR.to_be_bytes().to_vec();
		bytes.extend_from_slice(&9u16.to_be_bytes());
		bytes.push(0);
		assert_eq!(Packet::decode(&bytes), Err(DecodeError::InvalidErrorCode(9)));
	}

	#[test]
	fn duplicate_option_last_wins_is_a_negotiator_concern_not_codec() {
		// the codec preserves order and duplicates; collapsing them is the
		// option negotiator's job (see tftp::options).
		let mut bytes = consts::OPCODE_OACK.to_be_bytes().to_vec();
		bytes.extend_from_slice(b"blksize\0512\0blksize\01024\0");
		let Packet::Oack { options } = Packet::decode(&bytes).unwrap() else { panic!() };
		assert_eq!(options.len(), 2);
	}
}
