//! Shared clap argument definitions for the two binaries. Kept in the
//! library crate (rather than under `src/bin/`) so both binaries parse
//! the same flag set the same way.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use simple_logger::SimpleLogger;

use crate::config::Config;
use crate::tftp::consts;

#[derive(Debug, Clone, ValueEnum, Default)]
pub enum DebugLevel {
	Off = 0,
	Error,

	#[default]
	Warn,
	Info,
	Debug,
	Trace,
}

impl From<DebugLevel> for log::LevelFilter {
	fn from(value: DebugLevel) -> Self {
		match value {
			DebugLevel::Off => Self::Off,
			DebugLevel::Error => Self::Error,
			DebugLevel::Warn => Self::Warn,
			DebugLevel::Info => Self::Info,
			DebugLevel::Debug => Self::Debug,
			DebugLevel::Trace => Self::Trace,
		}
	}
}

pub fn init_logger(debug_level: DebugLevel) {
	SimpleLogger::new().with_level(debug_level.into()).env().init().unwrap();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "A TFTP server")]
pub struct ServerOptions {
	#[arg(value_enum, short, long, default_value_t = DebugLevel::Warn, help = "Debug level to determine which messages are printed")]
	pub debug: DebugLevel,

	#[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
	pub bind: IpAddr,

	#[arg(short, long, default_value_t = consts::TFTP_LISTEN_PORT)]
	pub port: u16,

	#[arg(short = 'r', long = "root", help = "Directory requests are served from; traversal outside it is rejected")]
	pub root_dir: PathBuf,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "A TFTP client")]
pub struct ClientOptions {
	#[arg(value_enum, short, long, default_value_t = DebugLevel::Warn, global = true)]
	pub debug: DebugLevel,

	#[command(flatten)]
	pub transfer_opts: TransferOpts,

	#[command(subcommand)]
	pub action: ClientAction,
}

#[derive(Debug, Args)]
pub struct TransferOpts {
	#[arg(short, long, help = "Requested block size (8-65464); omit to not negotiate it")]
	pub blksize: Option<u16>,

	#[arg(short, long, default_value_t = consts::DEFAULT_TIMEOUT_SECS)]
	pub timeout: u64,

	#[arg(short = 'R', long, default_value_t = consts::DEFAULT_RETRIES)]
	pub retries: u8,

	#[arg(short = 'T', long, default_value_t = false, help = "Request (GET) or advertise (PUT) the transfer size")]
	pub transfer_size: bool,
}

impl TransferOpts {
	pub fn to_config(&self) -> Config {
		Config {
			blksize: self.blksize,
			tsize: self.transfer_size.then_some(0),
			timeout_secs: self.timeout,
			retries: self.retries,
			tftproot: None,
		}
	}
}

#[derive(Debug, Args)]
pub struct ClientActionOpts {
	#[arg(help = "Local file to read from or write to; defaults to stdout/stdin")]
	pub file: Option<PathBuf>,

	#[arg(help = "The remote file name to request")]
	pub remote_file: String,

	#[arg(help = "The remote server to connect to")]
	pub server: IpAddr,

	#[arg(default_value_t = consts::TFTP_LISTEN_PORT, help = "The remote port to connect to")]
	pub port: u16,
}

#[derive(Subcommand, Debug)]
pub enum ClientAction {
	/// Download a file from the server.
	Get {
		#[command(flatten)]
		opts: ClientActionOpts,
	},
	/// Upload a file to the server.
	Put {
		#[command(flatten)]
		opts: ClientActionOpts,
	},
}
