//! End-to-end coverage driving `TftpServer`/`TftpClient` over real loopback
//! UDP sockets, the way `mhajder-tftp-rs/tests/integration.rs` exercises its
//! own server: bind on an OS-assigned port, run the server in the
//! background, and drive the client's blocking API from a `spawn_blocking`
//! task so both sides make progress on a multi-threaded runtime.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use snowy_tftp::{Config, TftpClient, TftpServer};
use tokio_util::sync::CancellationToken;

fn loopback(port: u16) -> IpAddr {
	let _ = port;
	IpAddr::V4(Ipv4Addr::LOCALHOST)
}

async fn start_server(root: std::path::PathBuf, config: Config) -> (SocketAddr, CancellationToken) {
	let server = TftpServer::new(SocketAddr::new(loopback(0), 0), root, config).expect("bind server");
	let addr = server.local_addr();
	let cancel = CancellationToken::new();
	let task_cancel = cancel.clone();
	tokio::spawn(async move { server.run(task_cancel).await });
	(addr, cancel)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_small_file_round_trips() {
	let dir = tempfile::tempdir().unwrap();
	let content = b"the quick brown fox jumps over the lazy dog".to_vec();
	std::fs::write(dir.path().join("greeting.txt"), &content).unwrap();

	let (server_addr, cancel) = start_server(dir.path().to_path_buf(), Config::default()).await;

	let dest = dir.path().join("downloaded.txt");
	let dest_for_task = dest.clone();
	let metrics = tokio::task::spawn_blocking(move || {
		let client = TftpClient::new(loopback(0), Config::default());
		let cancel = CancellationToken::new();
		client.download(server_addr, b"greeting.txt", Some(&dest_for_task), &cancel)
	})
	.await
	.unwrap()
	.expect("download succeeds");

	assert_eq!(std::fs::read(&dest).unwrap(), content);
	assert_eq!(metrics.bytes_transferred, content.len() as u64);
	cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_with_requested_blksize_round_trips() {
	let dir = tempfile::tempdir().unwrap();
	let content = vec![7u8; 3000];
	let src = dir.path().join("upload_src.bin");
	std::fs::write(&src, &content).unwrap();

	let config = Config { blksize: Some(1024), ..Config::default() };
	let (server_addr, cancel) = start_server(dir.path().to_path_buf(), Config::default()).await;

	let metrics = tokio::task::spawn_blocking(move || {
		let client = TftpClient::new(loopback(0), config);
		let cancel = CancellationToken::new();
		client.upload(server_addr, b"uploaded.bin", Some(&src), &cancel)
	})
	.await
	.unwrap()
	.expect("upload succeeds");

	let written = std::fs::read(dir.path().join("uploaded.bin")).unwrap();
	assert_eq!(written, content);
	assert_eq!(metrics.bytes_transferred, content.len() as u64);
	cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_of_missing_file_fails() {
	let dir = tempfile::tempdir().unwrap();
	let (server_addr, cancel) = start_server(dir.path().to_path_buf(), Config::default()).await;

	let dest = dir.path().join("nope.txt");
	let dest_for_task = dest.clone();
	let result = tokio::task::spawn_blocking(move || {
		let client = TftpClient::new(loopback(0), Config::default());
		let cancel = CancellationToken::new();
		client.download(server_addr, b"does-not-exist.txt", Some(&dest_for_task), &cancel)
	})
	.await
	.unwrap();

	assert!(result.is_err());
	assert!(!dest.exists());
	cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_rejects_path_traversal() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("secret.txt"), b"top secret").unwrap();
	let (server_addr, cancel) = start_server(dir.path().to_path_buf(), Config::default()).await;

	let dest = dir.path().join("escaped.txt");
	let dest_for_task = dest.clone();
	let result = tokio::task::spawn_blocking(move || {
		let client = TftpClient::new(loopback(0), Config::default());
		let cancel = CancellationToken::new();
		client.download(server_addr, b"../../../../etc/passwd", Some(&dest_for_task), &cancel)
	})
	.await
	.unwrap();

	assert!(result.is_err());
	assert!(!dest.exists());
	cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_side_timeout_fires_on_unresponsive_session() {
	// Exercises the driver's own timeout/retry path rather than the happy
	// path: start a download, then immediately cancel the client's token so
	// its run_session loop observes cancellation instead of completing.
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("big.bin"), vec![0u8; 10]).unwrap();
	let (server_addr, server_cancel) = start_server(dir.path().to_path_buf(), Config::default()).await;

	let client_cancel = CancellationToken::new();
	client_cancel.cancel();

	let dest = dir.path().join("out.bin");
	let result = tokio::task::spawn_blocking(move || {
		let client = TftpClient::new(loopback(0), Config::default());
		client.download(server_addr, b"big.bin", Some(&dest), &client_cancel)
	})
	.await
	.unwrap();

	assert!(matches!(result, Err(e) if matches!(e.kind, snowy_tftp::TftpErrorKind::Cancelled)));
	server_cancel.cancel();
}
