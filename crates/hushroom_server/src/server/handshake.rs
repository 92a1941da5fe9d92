#![forbid(unsafe_code)]

use std::time::Duration;

use hushroom_protocol::{Handshake, HandshakeError, LineError, LineReader, SessionKey};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tracing::debug;

#[derive(Debug, Error)]
pub enum HandshakeFailure {
	#[error("peer closed before completing the handshake")]
	Closed,

	#[error("handshake timed out after {0:?}")]
	TimedOut(Duration),

	#[error("handshake read failed: {0}")]
	Read(#[from] LineError),

	#[error(transparent)]
	Key(#[from] HandshakeError),

	#[error("failed to send public key: {0}")]
	Write(#[from] std::io::Error),
}

impl HandshakeFailure {
	/// Short label for the failure metric.
	pub fn reason(&self) -> &'static str {
		match self {
			HandshakeFailure::Closed => "closed",
			HandshakeFailure::TimedOut(_) => "timeout",
			HandshakeFailure::Read(_) => "read",
			HandshakeFailure::Key(_) => "key",
			HandshakeFailure::Write(_) => "write",
		}
	}
}

/// Server side of the key exchange: wait for the client's public key line,
/// then answer with ours. Lines without the marker are discarded.
pub async fn accept_handshake<R, W>(
	reader: &mut LineReader<R>,
	writer: &mut W,
	timeout: Option<Duration>,
) -> Result<SessionKey, HandshakeFailure>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	match timeout {
		Some(limit) => tokio::time::timeout(limit, exchange(reader, writer))
			.await
			.map_err(|_| HandshakeFailure::TimedOut(limit))?,
		None => exchange(reader, writer).await,
	}
}

async fn exchange<R, W>(reader: &mut LineReader<R>, writer: &mut W) -> Result<SessionKey, HandshakeFailure>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut handshake = Handshake::new();
	let mut discarded: u64 = 0;

	loop {
		let Some(line) = reader.read_line().await? else {
			return Err(HandshakeFailure::Closed);
		};

		if let Some(key) = handshake.receive_line(&line)? {
			writer.write_all(&handshake.public_line()).await?;
			writer.flush().await?;

			if discarded > 0 {
				debug!(discarded, "handshake: ignored lines before peer key");
			}
			return Ok(key);
		}

		discarded += 1;
	}
}

#[cfg(test)]
mod tests {
	use hushroom_protocol::{DEFAULT_MAX_LINE_SIZE, HANDSHAKE_MARKER};
	use tokio::io::{AsyncWriteExt as _, duplex};

	use super::*;

	#[tokio::test]
	async fn derives_the_same_key_as_the_client() {
		let (client_io, server_io) = duplex(4096);
		let (server_read, mut server_write) = tokio::io::split(server_io);
		let (client_read, mut client_write) = tokio::io::split(client_io);

		let server = tokio::spawn(async move {
			let mut reader = LineReader::new(server_read, DEFAULT_MAX_LINE_SIZE);
			accept_handshake(&mut reader, &mut server_write, None).await
		});

		let mut client = Handshake::new();
		client_write.write_all(b"noise before the key\n").await.expect("write");
		client_write.write_all(&client.public_line()).await.expect("write");

		let mut reader = LineReader::new(client_read, DEFAULT_MAX_LINE_SIZE);
		let line = reader.read_line().await.expect("read").expect("server line");
		let client_key = client.receive_line(&line).expect("derive").expect("key");

		let server_key = server.await.expect("join").expect("handshake");
		assert_eq!(client_key, server_key);
	}

	#[tokio::test]
	async fn closed_before_key_is_reported() {
		let (client_io, server_io) = duplex(1024);
		let (server_read, mut server_write) = tokio::io::split(server_io);
		drop(client_io);

		let mut reader = LineReader::new(server_read, DEFAULT_MAX_LINE_SIZE);
		let err = accept_handshake(&mut reader, &mut server_write, None).await.unwrap_err();
		assert!(matches!(err, HandshakeFailure::Closed));
	}

	#[tokio::test]
	async fn silent_peer_times_out() {
		let (_client_io, server_io) = duplex(1024);
		let (server_read, mut server_write) = tokio::io::split(server_io);

		let mut reader = LineReader::new(server_read, DEFAULT_MAX_LINE_SIZE);
		let limit = Duration::from_millis(50);
		let err = accept_handshake(&mut reader, &mut server_write, Some(limit))
			.await
			.unwrap_err();
		assert!(matches!(err, HandshakeFailure::TimedOut(d) if d == limit));
		assert_eq!(err.reason(), "timeout");
	}

	#[tokio::test]
	async fn short_peer_key_fails() {
		let (mut client_io, server_io) = duplex(1024);
		let (server_read, mut server_write) = tokio::io::split(server_io);

		let mut line = HANDSHAKE_MARKER.as_bytes().to_vec();
		line.extend_from_slice(b"abc\n");
		client_io.write_all(&line).await.expect("write");

		let mut reader = LineReader::new(server_read, DEFAULT_MAX_LINE_SIZE);
		let err = accept_handshake(&mut reader, &mut server_write, None).await.unwrap_err();
		assert!(matches!(err, HandshakeFailure::Key(HandshakeError::InvalidPeerKey(3))));
	}
}
