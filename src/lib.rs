//! A TFTP (RFC 1350, with the RFC 2347 option extension, RFC 2348 `blksize`
//! and RFC 2349 `tsize`) client and server engine.
//!
//! The `tftp` module is the protocol core: packet codec, option
//! negotiation, session context and the state machine that drives a
//! transfer. [`client`] and [`server`] build filesystem- and
//! network-aware sessions on top of it; both are gated behind their
//! respective Cargo features so a consumer that only needs one side
//! doesn't pull in the other's dependencies.

pub mod cli;
pub mod config;
pub mod tftp;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;

pub use config::Config;
pub use tftp::context::{Metrics, PacketDirection, PacketEvent, PacketHook, Role};
pub use tftp::error::{DecodeError, OptionError, RequestError, TftpError, TftpErrorKind};
pub use tftp::packet::Packet;

#[cfg(feature = "client")]
pub use client::TftpClient;
#[cfg(feature = "server")]
pub use server::TftpServer;
