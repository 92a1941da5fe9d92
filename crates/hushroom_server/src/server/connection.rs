#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use bytes::BytesMut;
use hushroom_domain::SessionId;
use hushroom_protocol::{DEFAULT_MAX_LINE_SIZE, LineReader, encode_line_into};
use tokio::io::{AsyncWrite, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_OUTBOUND_QUEUE_CAPACITY, ServerSettings};
use crate::server::context::ServerContext;
use crate::server::handshake::accept_handshake;
use crate::server::membership::Outbox;
use crate::server::router::{self, Session, SessionEnd};

/// Queued output a closing session may still flush before it is cut off.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Soft cap on bytes coalesced into a single socket write.
const WRITE_BATCH_BYTES: usize = 64 * 1024;

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	pub handshake_timeout: Option<Duration>,
	/// Inbound line limit. Outbound ciphertext is not checked against it.
	pub max_line_bytes: usize,
	pub outbound_queue_capacity: usize,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			handshake_timeout: Some(Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS)),
			max_line_bytes: DEFAULT_MAX_LINE_SIZE,
			outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
		}
	}
}

impl From<&ServerSettings> for ConnectionSettings {
	fn from(s: &ServerSettings) -> Self {
		Self {
			handshake_timeout: s.handshake_timeout,
			max_line_bytes: s.max_line_bytes,
			outbound_queue_capacity: s.outbound_queue_capacity,
		}
	}
}

/// Drive one TCP connection from handshake to teardown.
///
/// The session leaves the membership map exactly once, whichever way the
/// receive loop ends.
pub async fn handle_connection(
	conn_id: u64,
	stream: TcpStream,
	peer: SocketAddr,
	ctx: Arc<ServerContext>,
) -> anyhow::Result<()> {
	let settings = ctx.settings.clone();
	let (read_half, mut write_half) = stream.into_split();
	let mut reader = LineReader::new(read_half, settings.max_line_bytes);

	let key = match accept_handshake(&mut reader, &mut write_half, settings.handshake_timeout).await {
		Ok(key) => key,
		Err(e) => {
			metrics::counter!("hushroom_server_handshake_failures_total", "reason" => e.reason()).increment(1);
			return Err(anyhow::Error::new(e).context("handshake"));
		}
	};

	let id = SessionId(conn_id);
	let (tx, rx) = mpsc::channel(settings.outbound_queue_capacity);
	let mut writer = spawn_writer(id, write_half, rx);
	let session = Session::new(id, peer.to_string(), Outbox::new(id, key, tx));

	info!(conn_id, %peer, "connected");
	router::admit(&ctx, &session).await;

	let result = router::run_session(&ctx, &session, &mut reader).await;

	ctx.membership.remove(id).await;
	drop(session);

	if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
		debug!(conn_id, "writer did not drain in time; aborting");
		writer.abort();
	}

	match result.context("session")? {
		SessionEnd::Quit => info!(conn_id, %peer, "disconnected (quit)"),
		SessionEnd::PeerClosed => info!(conn_id, %peer, "disconnected (peer closed)"),
	}

	Ok(())
}

/// Spawn the task that owns the write half. It exits, closing the stream,
/// once every sender is dropped or a write fails.
pub(crate) fn spawn_writer<W>(id: SessionId, mut io: W, mut rx: mpsc::Receiver<String>) -> JoinHandle<()>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		let mut buf = BytesMut::with_capacity(4 * 1024);

		while let Some(first) = rx.recv().await {
			buf.clear();
			push_line(id, &mut buf, &first);
			while buf.len() < WRITE_BATCH_BYTES
				&& let Ok(next) = rx.try_recv()
			{
				push_line(id, &mut buf, &next);
			}

			if let Err(e) = write_batch(&mut io, &buf).await {
				debug!(conn_id = id.0, error = %e, "write failed; closing writer");
				return;
			}
		}

		if let Err(e) = io.shutdown().await {
			debug!(conn_id = id.0, error = %e, "shutdown after drain failed");
		}
	})
}

fn push_line(id: SessionId, buf: &mut BytesMut, line: &str) {
	if let Err(e) = encode_line_into(buf, line.as_bytes(), usize::MAX) {
		warn!(conn_id = id.0, error = %e, "unframeable outbound line dropped");
	}
}

async fn write_batch<W: AsyncWrite + Unpin>(io: &mut W, buf: &[u8]) -> std::io::Result<()> {
	io.write_all(buf).await?;
	io.flush().await
}
