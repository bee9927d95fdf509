use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use log::error;
use tokio_util::sync::CancellationToken;

use snowy_tftp::cli::{init_logger, ClientAction, ClientActionOpts, ClientOptions};
use snowy_tftp::client::TftpClient;

fn local_addr_for(server: IpAddr) -> IpAddr {
	match server {
		IpAddr::V4(_) => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
		IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
	}
}

fn main() {
	let opts = ClientOptions::parse();
	init_logger(opts.debug);

	let config = opts.transfer_opts.to_config();
	let cancel = CancellationToken::new();

	let (action_opts, is_get): (&ClientActionOpts, bool) = match &opts.action {
		ClientAction::Get { opts } => (opts, true),
		ClientAction::Put { opts } => (opts, false),
	};

	let server = SocketAddr::new(action_opts.server, action_opts.port);
	let client = TftpClient::new(local_addr_for(action_opts.server), config);
	let remote_file = action_opts.remote_file.as_bytes();

	let result = if is_get {
		client.download(server, remote_file, action_opts.file.as_deref(), &cancel)
	} else {
		client.upload(server, remote_file, action_opts.file.as_deref(), &cancel)
	};

	if let Err(e) = result {
		error!("transfer failed: {e}");
		std::process::exit(1);
	}
}
