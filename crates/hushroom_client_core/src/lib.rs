#![forbid(unsafe_code)]

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use hushroom_protocol::{
	CipherError, DEFAULT_MAX_LINE_SIZE, Handshake, HandshakeError, LineError, LineReader, QUIT_SENTINEL, ROOM_COMMAND,
	SessionKey, decrypt, encrypt, write_line,
};
use hushroom_util::endpoint::{DEFAULT_PORT, TcpEndpoint};
use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Remote server host (DNS name or IP literal).
	pub server_host: String,

	pub server_port: u16,

	/// Resolved address; skips DNS when set.
	pub server_addr: Option<SocketAddr>,

	/// Longest accepted inbound line.
	pub max_line_bytes: usize,

	/// Timeout for TCP connect and for the key exchange, each.
	pub connect_timeout: Duration,
}

impl ClientConfig {
	/// Parse a `tcp://host:port` endpoint into `(host, port)`.
	pub fn parse_tcp_endpoint(endpoint: &str) -> Result<(String, u16), ClientCoreError> {
		let e = TcpEndpoint::parse(endpoint)
			.map_err(|msg| ClientCoreError::Protocol(format!("invalid endpoint (expected tcp://host:port): {msg}")))?;
		Ok((e.host, e.port))
	}

	pub fn from_tcp_endpoint(endpoint: &str) -> Result<Self, ClientCoreError> {
		let (host, port) = Self::parse_tcp_endpoint(endpoint)?;
		let server_addr = TcpEndpoint {
			host: host.clone(),
			port,
		}
		.to_socket_addr_if_ip_literal()
		.ok();

		Ok(Self {
			server_host: host,
			server_port: port,
			server_addr,
			..Self::default()
		})
	}

	pub fn from_addr(addr: SocketAddr) -> Self {
		Self {
			server_host: addr.ip().to_string(),
			server_port: addr.port(),
			server_addr: Some(addr),
			..Self::default()
		}
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			server_host: "localhost".to_string(),
			server_port: DEFAULT_PORT,
			server_addr: Some(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))),
			max_line_bytes: DEFAULT_MAX_LINE_SIZE,
			connect_timeout: Duration::from_secs(15),
		}
	}
}

/// Errors for client core operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientCoreError {
	/// Connection establishment failed.
	#[error("failed to connect: {0}")]
	Connect(String),

	/// Key exchange failed.
	#[error(transparent)]
	Handshake(#[from] HandshakeError),

	#[error(transparent)]
	Line(#[from] LineError),

	#[error(transparent)]
	Cipher(#[from] CipherError),

	/// Protocol error (bad endpoint, non-text line, early close).
	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

/// Outbound half of a session.
pub struct ChatSender {
	write: OwnedWriteHalf,
	key: SessionKey,
}

/// Inbound half of a session.
pub struct ChatReceiver {
	reader: LineReader<OwnedReadHalf>,
	key: SessionKey,
}

/// An established, encrypted chat session.
pub struct ChatClient {
	sender: ChatSender,
	receiver: ChatReceiver,
	peer: SocketAddr,
	local: SocketAddr,
}

impl ChatClient {
	/// Connect and run the key exchange. The server's first encrypted lines
	/// (its welcome) are left unread.
	pub async fn connect(cfg: ClientConfig) -> Result<Self, ClientCoreError> {
		let connect_timeout = cfg.connect_timeout;

		let candidates: Vec<SocketAddr> = match cfg.server_addr {
			Some(addr) => vec![addr],
			None => {
				let hostport = format!("{}:{}", cfg.server_host, cfg.server_port);
				let addrs: Vec<SocketAddr> = hostport
					.to_socket_addrs()
					.map_err(|e| ClientCoreError::Connect(format!("failed to resolve {hostport}: {e}")))?
					.collect();
				if addrs.is_empty() {
					return Err(ClientCoreError::Connect(format!(
						"DNS resolution returned no addresses for {hostport}"
					)));
				}
				addrs
			}
		};

		let mut last_err: Option<String> = None;
		let mut stream: Option<TcpStream> = None;

		for addr in candidates {
			match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
				Ok(Ok(s)) => {
					stream = Some(s);
					break;
				}
				Ok(Err(e)) => last_err = Some(format!("connect failed (addr={addr}): {e}")),
				Err(_) => last_err = Some(format!("connect timeout after {connect_timeout:?} (addr={addr})")),
			}
		}

		let stream = stream.ok_or_else(|| {
			ClientCoreError::Connect(last_err.unwrap_or_else(|| "connect failed (no addresses attempted)".to_string()))
		})?;

		let peer = stream.peer_addr()?;
		let local = stream.local_addr()?;
		info!(remote = %peer, "connected");

		let (read_half, mut write_half) = stream.into_split();
		let mut reader = LineReader::new(read_half, cfg.max_line_bytes);

		let key = tokio::time::timeout(connect_timeout, client_handshake(&mut reader, &mut write_half))
			.await
			.map_err(|_| ClientCoreError::Protocol(format!("timeout waiting for server key after {connect_timeout:?}")))??;
		debug!("session key established");

		Ok(Self {
			sender: ChatSender {
				write: write_half,
				key: key.clone(),
			},
			receiver: ChatReceiver { reader, key },
			peer,
			local,
		})
	}

	pub fn peer_addr(&self) -> SocketAddr {
		self.peer
	}

	/// Local address; the server uses it as this client's name in notices.
	pub fn local_addr(&self) -> SocketAddr {
		self.local
	}

	pub fn split(self) -> (ChatSender, ChatReceiver) {
		(self.sender, self.receiver)
	}

	pub async fn send_text(&mut self, text: &str) -> Result<(), ClientCoreError> {
		self.sender.send_text(text).await
	}

	pub async fn recv_text(&mut self) -> Result<Option<String>, ClientCoreError> {
		self.receiver.recv_text().await
	}

	pub async fn list_rooms(&mut self) -> Result<(), ClientCoreError> {
		self.sender.list_rooms().await
	}

	pub async fn join_room(&mut self, name: &str) -> Result<(), ClientCoreError> {
		self.sender.join_room(name).await
	}

	pub async fn quit(self) -> Result<(), ClientCoreError> {
		self.sender.quit().await
	}
}

impl ChatSender {
	/// Encrypt and send `text` verbatim. Chat lines conventionally end in `\n`.
	pub async fn send_text(&mut self, text: &str) -> Result<(), ClientCoreError> {
		let line = encrypt(&self.key, text);
		write_line(&mut self.write, line.as_bytes(), usize::MAX).await?;
		Ok(())
	}

	pub async fn list_rooms(&mut self) -> Result<(), ClientCoreError> {
		self.send_text(&format!("{ROOM_COMMAND}\n")).await
	}

	pub async fn join_room(&mut self, name: &str) -> Result<(), ClientCoreError> {
		self.send_text(&format!("{ROOM_COMMAND} {name}\n")).await
	}

	/// Send the quit sentinel and close the write side.
	pub async fn quit(mut self) -> Result<(), ClientCoreError> {
		self.send_text(QUIT_SENTINEL).await?;
		self.write.shutdown().await?;
		Ok(())
	}
}

impl ChatReceiver {
	/// Next decrypted server line; `None` once the server closes.
	pub async fn recv_text(&mut self) -> Result<Option<String>, ClientCoreError> {
		loop {
			let Some(line) = self.reader.read_line().await? else {
				return Ok(None);
			};
			if line.is_empty() {
				continue;
			}

			let text = std::str::from_utf8(&line)
				.map_err(|_| ClientCoreError::Protocol("server sent a non-text line".to_string()))?;
			return Ok(Some(decrypt(&self.key, text)?));
		}
	}

	/// Feed every decrypted line to `on_text` until the server closes.
	pub async fn run_loop<F>(&mut self, mut on_text: F) -> Result<(), ClientCoreError>
	where
		F: FnMut(String),
	{
		while let Some(text) = self.recv_text().await? {
			on_text(text);
		}
		Ok(())
	}
}

/// Client side of the key exchange: send our key first, then wait for the
/// server's marker line.
async fn client_handshake(
	reader: &mut LineReader<OwnedReadHalf>,
	write: &mut OwnedWriteHalf,
) -> Result<SessionKey, ClientCoreError> {
	let mut handshake = Handshake::new();
	write.write_all(&handshake.public_line()).await?;
	write.flush().await?;

	loop {
		let Some(line) = reader.read_line().await? else {
			return Err(ClientCoreError::Protocol("server closed during key exchange".to_string()));
		};
		if let Some(key) = handshake.receive_line(&line)? {
			return Ok(key);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn endpoint_with_ip_literal_resolves_without_dns() {
		let cfg = ClientConfig::from_tcp_endpoint("tcp://127.0.0.1:9000").expect("endpoint");
		assert_eq!(cfg.server_port, 9000);
		assert_eq!(cfg.server_addr, Some(SocketAddr::from(([127, 0, 0, 1], 9000))));
	}

	#[test]
	fn endpoint_with_hostname_defers_to_dns() {
		let cfg = ClientConfig::from_tcp_endpoint("tcp://chat.example.com:8081").expect("endpoint");
		assert_eq!(cfg.server_host, "chat.example.com");
		assert_eq!(cfg.server_addr, None);
	}

	#[test]
	fn wrong_scheme_is_a_protocol_error() {
		let err = ClientConfig::from_tcp_endpoint("quic://127.0.0.1:9000").unwrap_err();
		assert!(matches!(err, ClientCoreError::Protocol(_)));
	}

	#[tokio::test]
	async fn connect_to_closed_port_fails() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
		let addr = listener.local_addr().expect("addr");
		drop(listener);

		let cfg = ClientConfig {
			connect_timeout: Duration::from_secs(2),
			..ClientConfig::from_addr(addr)
		};
		assert!(matches!(ChatClient::connect(cfg).await, Err(ClientCoreError::Connect(_))));
	}
}
