//! The protocol engine: wire codec, option negotiation, session context,
//! state machine and the I/O abstractions (`Endpoint`, `TransferStream`)
//! it's driven through. Nothing in this module touches a filesystem path
//! or binds a real socket directly — that's left to `client.rs`/`server.rs`.

pub mod consts;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod options;
pub mod packet;
pub mod session;
pub mod state_machine;
pub mod stream;
