#![forbid(unsafe_code)]

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

use crate::framing::{FramingError, encode_line, try_decode_line_from_buffer};

#[derive(Debug, Error)]
pub enum LineError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Framing(#[from] FramingError),
}

/// Buffered line reader over any async byte stream.
#[derive(Debug)]
pub struct LineReader<R> {
	inner: R,
	buf: BytesMut,
	max_line_size: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
	pub fn new(inner: R, max_line_size: usize) -> Self {
		Self {
			inner,
			buf: BytesMut::with_capacity(8 * 1024),
			max_line_size,
		}
	}

	/// Read the next line, delimiter stripped.
	///
	/// `Ok(None)` means the peer closed the stream; a trailing partial line is
	/// discarded.
	pub async fn read_line(&mut self) -> Result<Option<BytesMut>, LineError> {
		loop {
			if let Some(line) = try_decode_line_from_buffer(&mut self.buf, self.max_line_size)? {
				return Ok(Some(line));
			}

			let n = self.inner.read_buf(&mut self.buf).await?;
			if n == 0 {
				return Ok(None);
			}
		}
	}
}

/// Frame `payload` as one line and write it.
pub async fn write_line<W: AsyncWrite + Unpin>(
	writer: &mut W,
	payload: &[u8],
	max_line_size: usize,
) -> Result<(), LineError> {
	let line = encode_line(payload, max_line_size)?;
	writer.write_all(&line).await?;
	writer.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::framing::DEFAULT_MAX_LINE_SIZE;

	#[tokio::test]
	async fn reads_lines_split_across_writes() {
		let (mut tx, rx) = tokio::io::duplex(64);
		let mut reader = LineReader::new(rx, DEFAULT_MAX_LINE_SIZE);

		tokio::spawn(async move {
			tx.write_all(b"one\ntw").await.expect("write");
			tx.write_all(b"o\n").await.expect("write");
		});

		assert_eq!(&reader.read_line().await.expect("ok").expect("line")[..], b"one");
		assert_eq!(&reader.read_line().await.expect("ok").expect("line")[..], b"two");
		assert!(reader.read_line().await.expect("ok").is_none());
	}

	#[tokio::test]
	async fn oversized_line_is_an_error() {
		let (mut tx, rx) = tokio::io::duplex(256);
		let mut reader = LineReader::new(rx, 8);

		tx.write_all(b"0123456789abcdef").await.expect("write");
		drop(tx);

		let err = reader.read_line().await.unwrap_err();
		assert!(matches!(err, LineError::Framing(FramingError::LineTooLarge { .. })));
	}

	#[tokio::test]
	async fn write_line_appends_delimiter() {
		let (mut tx, rx) = tokio::io::duplex(64);
		write_line(&mut tx, b"ping", DEFAULT_MAX_LINE_SIZE).await.expect("write");
		drop(tx);

		let mut reader = LineReader::new(rx, DEFAULT_MAX_LINE_SIZE);
		assert_eq!(&reader.read_line().await.expect("ok").expect("line")[..], b"ping");
	}
}
