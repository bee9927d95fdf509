//! Polymorphic file-like endpoints for transfer content. The engine only
//! ever sees these two capability traits; actual file/path resolution
//! lives in the server/client binaries.

use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Write};

/// The source side of an upload: the engine calls `read` repeatedly until
/// it gets back fewer bytes than requested, which signals EOF (the final
/// call returns an empty `Vec`).
pub trait ReadStream: Send {
	fn read(&mut self, n: usize) -> io::Result<Vec<u8>>;
}

/// The sink side of a download.
pub trait WriteStream: Send {
	fn write(&mut self, data: &[u8]) -> io::Result<()>;
	fn close(&mut self) -> io::Result<()>;
}

/// Either capability, chosen by [`crate::tftp::context::Role`] at session
/// construction time — a session only ever drives one direction.
pub enum TransferStream {
	Reader(Box<dyn ReadStream>),
	Writer(Box<dyn WriteStream>),
}

impl TransferStream {
	pub fn read_block(&mut self, n: usize) -> io::Result<Vec<u8>> {
		match self {
			Self::Reader(r) => r.read(n),
			Self::Writer(_) => Err(io::Error::new(io::ErrorKind::Other, "stream is write-only")),
		}
	}

	pub fn write_block(&mut self, data: &[u8]) -> io::Result<()> {
		match self {
			Self::Writer(w) => w.write(data),
			Self::Reader(_) => Err(io::Error::new(io::ErrorKind::Other, "stream is read-only")),
		}
	}

	pub fn close(&mut self) -> io::Result<()> {
		match self {
			Self::Writer(w) => w.close(),
			Self::Reader(_) => Ok(()),
		}
	}
}

/// Reads a regular file in fixed-size blocks.
pub struct FileReadStream(BufReader<std::fs::File>);

impl FileReadStream {
	pub fn new(file: std::fs::File) -> Self {
		Self(BufReader::new(file))
	}
}

impl ReadStream for FileReadStream {
	fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
		let mut buf = vec![0u8; n];
		let mut total = 0;
		while total < n {
			match self.0.read(&mut buf[total..])? {
				0 => break,
				read => total += read,
			}
		}
		buf.truncate(total);
		Ok(buf)
	}
}

/// Writes a regular file, flushing on `close`.
pub struct FileWriteStream(BufWriter<std::fs::File>);

impl FileWriteStream {
	pub fn new(file: std::fs::File) -> Self {
		Self(BufWriter::new(file))
	}
}

impl WriteStream for FileWriteStream {
	fn write(&mut self, data: &[u8]) -> io::Result<()> {
		self.0.write_all(data)
	}

	fn close(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

/// An in-memory upload source, useful for tests and for serving
/// already-buffered content without touching a filesystem.
pub struct BufferReadStream(Cursor<Vec<u8>>);

impl BufferReadStream {
	pub fn new(data: Vec<u8>) -> Self {
		Self(Cursor::new(data))
	}
}

impl ReadStream for BufferReadStream {
	fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
		let mut buf = vec![0u8; n];
		let mut total = 0;
		while total < n {
			match self.0.read(&mut buf[total..])? {
				0 => break,
				read => total += read,
			}
		}
		buf.truncate(total);
		Ok(buf)
	}
}

/// An in-memory download sink; `into_inner` recovers the received bytes.
#[derive(Default)]
pub struct BufferWriteStream(Vec<u8>);

impl BufferWriteStream {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn into_inner(self) -> Vec<u8> {
		self.0
	}
}

impl WriteStream for BufferWriteStream {
	fn write(&mut self, data: &[u8]) -> io::Result<()> {
		self.0.extend_from_slice(data);
		Ok(())
	}

	fn close(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// Adapts standard input as an upload source.
pub struct StdinReadStream(io::Stdin);

impl StdinReadStream {
	pub fn new() -> Self {
		Self(io::stdin())
	}
}

impl Default for StdinReadStream {
	fn default() -> Self {
		Self::new()
	}
}

impl ReadStream for StdinReadStream {
	fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
		let mut buf = vec![0u8; n];
		let mut total = 0;
		let mut lock = self.0.lock();
		while total < n {
			let chunk = lock.fill_buf()?;
			if chunk.is_empty() {
				break;
			}
			let take = chunk.len().min(n - total);
			buf[total..total + take].copy_from_slice(&chunk[..take]);
			lock.consume(take);
			total += take;
		}
		buf.truncate(total);
		Ok(buf)
	}
}

/// Adapts standard output as a download sink.
pub struct StdoutWriteStream(io::Stdout);

impl StdoutWriteStream {
	pub fn new() -> Self {
		Self(io::stdout())
	}
}

impl Default for StdoutWriteStream {
	fn default() -> Self {
		Self::new()
	}
}

impl WriteStream for StdoutWriteStream {
	fn write(&mut self, data: &[u8]) -> io::Result<()> {
		self.0.lock().write_all(data)
	}

	fn close(&mut self) -> io::Result<()> {
		self.0.lock().flush()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn buffer_read_stream_yields_short_read_at_eof() {
		let mut s = BufferReadStream::new(vec![1, 2, 3]);
		assert_eq!(s.read(2).unwrap(), vec![1, 2]);
		assert_eq!(s.read(2).unwrap(), vec![3]);
		assert_eq!(s.read(2).unwrap(), Vec::<u8>::new());
	}

	#[test]
	fn buffer_write_stream_accumulates() {
		let mut s = BufferWriteStream::new();
		s.write(&[1, 2]).unwrap();
		s.write(&[3]).unwrap();
		s.close().unwrap();
		assert_eq!(s.into_inner(), vec![1, 2, 3]);
	}
}
