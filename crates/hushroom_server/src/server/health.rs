#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::warn;

use crate::server::context::ServerContext;

/// Readiness flag flipped once the chat listener is bound.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
	ready: Arc<AtomicBool>,
}

impl HealthState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Relaxed);
	}

	pub fn mark_not_ready(&self) {
		self.ready.store(false, Ordering::Relaxed);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Relaxed)
	}
}

/// Serve `/healthz`, `/readyz` and `/statusz` on `bind`.
pub fn spawn_health_server(bind: SocketAddr, state: HealthState, ctx: Arc<ServerContext>) {
	tokio::spawn(async move {
		if let Err(err) = run_health_server(bind, state, ctx).await {
			warn!(error = %err, "health server stopped");
		}
	});
}

async fn run_health_server(bind: SocketAddr, state: HealthState, ctx: Arc<ServerContext>) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind).await?;
	loop {
		let (stream, _addr) = listener.accept().await?;
		let io = TokioIo::new(stream);
		let state = state.clone();
		let ctx = Arc::clone(&ctx);
		tokio::spawn(async move {
			let service = service_fn(move |req| handle_health(req, state.clone(), Arc::clone(&ctx)));
			if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
				warn!(error = %err, "health connection error");
			}
		});
	}
}

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
	let mut resp = Response::new(Full::new(body.into()));
	*resp.status_mut() = status;
	resp
}

async fn handle_health(
	req: Request<Incoming>,
	state: HealthState,
	ctx: Arc<ServerContext>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
	if req.method() != Method::GET {
		return Ok(reply(StatusCode::METHOD_NOT_ALLOWED, Bytes::new()));
	}

	let resp = match req.uri().path() {
		"/healthz" => reply(StatusCode::OK, Bytes::from_static(b"ok")),
		"/readyz" if state.is_ready() => reply(StatusCode::OK, Bytes::from_static(b"ready")),
		"/readyz" => reply(StatusCode::SERVICE_UNAVAILABLE, Bytes::from_static(b"not-ready")),
		"/statusz" => reply(StatusCode::OK, status_report(&ctx).await),
		_ => reply(StatusCode::NOT_FOUND, Bytes::new()),
	};
	Ok(resp)
}

/// Plain-text occupancy: total sessions, then one line per room.
pub async fn status_report(ctx: &ServerContext) -> String {
	let counts = ctx.membership.room_counts().await;
	let total: usize = counts.values().sum();

	let mut out = format!("sessions {total}\n");
	for (idx, room) in ctx.registry.iter() {
		let _ = writeln!(out, "room {} {}", room.name, counts.get(&idx).copied().unwrap_or(0));
	}
	out
}
