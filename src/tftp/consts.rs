//! Wire constants and protocol defaults. Defaults live on [`crate::Config`]
//! (see `config.rs`); nothing here is mutable process-wide state.

pub const TFTP_LISTEN_PORT: u16 = 69;

pub const DEFAULT_BLKSIZE: u16 = 512;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RETRIES: u8 = 3;

pub const OPCODE_RRQ: u16 = 1;
pub const OPCODE_WRQ: u16 = 2;
pub const OPCODE_DATA: u16 = 3;
pub const OPCODE_ACK: u16 = 4;
pub const OPCODE_ERROR: u16 = 5;
pub const OPCODE_OACK: u16 = 6;

pub const MODE_OCTET: &[u8] = b"octet";
