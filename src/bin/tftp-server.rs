use std::net::SocketAddr;

use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use snowy_tftp::cli::{init_logger, ServerOptions};
use snowy_tftp::config::Config;
use snowy_tftp::server::TftpServer;

#[tokio::main]
async fn main() {
	let opts = ServerOptions::parse();
	init_logger(opts.debug);

	let root_dir = match shellexpand::full(&opts.root_dir.to_string_lossy()) {
		Ok(expanded) => std::path::PathBuf::from(expanded.into_owned()),
		Err(_) => opts.root_dir.clone(),
	};

	let config = Config { tftproot: Some(root_dir.clone()), ..Config::default() };
	let listen_addr = SocketAddr::new(opts.bind, opts.port);

	let server = match TftpServer::new(listen_addr, root_dir, config) {
		Ok(server) => server,
		Err(e) => {
			error!("failed to bind {listen_addr}: {e}");
			std::process::exit(1);
		}
	};

	let cancel = CancellationToken::new();
	let signal_cancel = cancel.clone();
	ctrlc::set_handler(move || {
		info!("received interrupt, shutting down");
		signal_cancel.cancel();
	})
	.expect("failed to install SIGINT handler");

	info!("listening on {listen_addr}");
	server.run(cancel).await;
}
