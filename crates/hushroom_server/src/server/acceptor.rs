#![forbid(unsafe_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::server::connection::handle_connection;
use crate::server::context::ServerContext;

/// Pause after a failed `accept` (e.g. fd exhaustion) before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A bound listener plus the state its sessions share.
pub struct Server {
	listener: TcpListener,
	ctx: Arc<ServerContext>,
}

impl Server {
	pub async fn bind(addr: SocketAddr, ctx: ServerContext) -> anyhow::Result<Self> {
		let listener = TcpListener::bind(addr)
			.await
			.with_context(|| format!("bind tcp listener on {addr}"))?;
		Ok(Self {
			listener,
			ctx: Arc::new(ctx),
		})
	}

	pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
		self.listener.local_addr().context("listener local address")
	}

	pub fn context(&self) -> Arc<ServerContext> {
		Arc::clone(&self.ctx)
	}

	/// Accept forever.
	pub async fn serve(self) -> anyhow::Result<()> {
		self.serve_until(std::future::pending()).await
	}

	/// Accept until `shutdown` resolves. Sessions already running are left to
	/// finish on their own.
	pub async fn serve_until<F>(self, shutdown: F) -> anyhow::Result<()>
	where
		F: Future<Output = ()>,
	{
		let Self { listener, ctx } = self;
		tokio::pin!(shutdown);

		let mut next_conn_id: u64 = 1;

		loop {
			let (stream, peer) = tokio::select! {
				_ = &mut shutdown => {
					info!("shutdown requested; no longer accepting connections");
					break;
				}
				accepted = listener.accept() => match accepted {
					Ok(pair) => pair,
					Err(e) => {
						warn!(error = %e, "accept failed");
						tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
						continue;
					}
				},
			};

			let conn_id = next_conn_id;
			next_conn_id += 1;
			metrics::counter!("hushroom_server_connections_total").increment(1);

			if let Err(e) = stream.set_nodelay(true) {
				warn!(conn_id, error = %e, "failed to set TCP_NODELAY");
			}

			let ctx = Arc::clone(&ctx);
			tokio::spawn(async move {
				if let Err(e) = handle_connection(conn_id, stream, peer, ctx).await {
					warn!(conn_id, %peer, error = %format!("{e:#}"), "connection ended with error");
				}
			});
		}

		Ok(())
	}
}
