#![forbid(unsafe_code)]

//! Per-session receive loop: decrypt, classify, then relay or run a command.

use hushroom_domain::SessionId;
use hushroom_protocol::{CipherError, Command, LineError, LineReader, decrypt};
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::server::context::ServerContext;
use crate::server::membership::{Delivery, Outbox, RoomChange, SessionEntry};
use crate::server::registry::RoomIndex;

/// Reply to `!room <current room>`.
pub const ALREADY_IN_ROOM: &str = "You are already in this room\nType !room to get a list of other available chatrooms\n";

#[derive(Debug, Error)]
pub enum SessionError {
	#[error(transparent)]
	Line(#[from] LineError),

	#[error("inbound line is not valid utf-8")]
	NotText,

	#[error(transparent)]
	Cipher(#[from] CipherError),
}

/// Why a session's receive loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
	Quit,
	PeerClosed,
}

/// Whether to keep reading after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Continue,
	Quit,
}

/// An established session as seen by the router.
#[derive(Debug, Clone)]
pub struct Session {
	pub id: SessionId,
	/// Sender identity used in join/leave notices.
	pub label: String,
	pub outbox: Outbox,
}

impl Session {
	pub fn new(id: SessionId, label: impl Into<String>, outbox: Outbox) -> Self {
		Self {
			id,
			label: label.into(),
			outbox,
		}
	}

	fn reply(&self, text: &str) -> Delivery {
		self.outbox.send(text)
	}
}

/// Put a freshly established session into the default room.
pub async fn admit(ctx: &ServerContext, session: &Session) -> RoomChange {
	let entry = SessionEntry {
		outbox: session.outbox.clone(),
		label: session.label.clone(),
		nick: None,
		room: ctx.default_room(),
	};
	let change = ctx.membership.admit(entry).await;
	announce(ctx, session, &change);
	change
}

/// Read and dispatch lines until quit, EOF or a session-fatal error.
pub async fn run_session<R>(
	ctx: &ServerContext,
	session: &Session,
	reader: &mut LineReader<R>,
) -> Result<SessionEnd, SessionError>
where
	R: AsyncRead + Unpin,
{
	loop {
		let Some(line) = reader.read_line().await? else {
			return Ok(SessionEnd::PeerClosed);
		};
		// CRLF clients: the carriage return is not part of the base64 payload.
		let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
		if line.is_empty() {
			continue;
		}

		let ciphertext = std::str::from_utf8(line).map_err(|_| SessionError::NotText)?;
		let plaintext = decrypt(session.outbox.key(), ciphertext)?;

		if handle_plaintext(ctx, session, &plaintext).await == Flow::Quit {
			return Ok(SessionEnd::Quit);
		}
	}
}

/// Act on one decrypted line.
pub async fn handle_plaintext(ctx: &ServerContext, session: &Session, plaintext: &str) -> Flow {
	let command = Command::parse(plaintext);
	if command != Command::Quit {
		info!(conn_id = session.id.0, peer = %session.label, text = %plaintext.trim_end(), "message");
	}

	match command {
		Command::Quit => return Flow::Quit,
		Command::ListRooms => {
			session.reply(&ctx.registry.listing());
		}
		Command::JoinRoom(target) => join_room(ctx, session, &target).await,
		Command::Chat(text) => relay(ctx, session, &text).await,
	}

	Flow::Continue
}

async fn relay(ctx: &ServerContext, session: &Session, text: &str) {
	let peers = ctx.membership.room_peers(session.id).await;

	let mut queued: u64 = 0;
	for peer in &peers {
		if peer.send(text) == Delivery::Queued {
			queued += 1;
		}
	}

	metrics::counter!("hushroom_server_messages_relayed_total").increment(queued);
}

async fn join_room(ctx: &ServerContext, session: &Session, target: &str) {
	let Some(current) = ctx.membership.room_of(session.id).await else {
		return;
	};

	if ctx.registry.name_of(current) == target {
		session.reply(ALREADY_IN_ROOM);
		return;
	}

	let Some(dest) = ctx.registry.find(target) else {
		debug!(conn_id = session.id.0, room = %target, "no such room; ignoring");
		return;
	};

	session.reply(&format!("Switching room: {}\n", ctx.registry.name_of(dest)));
	switch_room(ctx, session, dest).await;
}

async fn switch_room(ctx: &ServerContext, session: &Session, dest: RoomIndex) {
	let Some(change) = ctx.membership.switch(session.id, dest).await else {
		return;
	};

	announce(ctx, session, &change);

	info!(
		conn_id = session.id.0,
		from = %change.previous.map(|r| ctx.registry.name_of(r)).unwrap_or_default(),
		to = %ctx.registry.name_of(dest),
		"switched room"
	);
}

/// Notify other sessions of a placement, then send the room's welcome text.
fn announce(ctx: &ServerContext, session: &Session, change: &RoomChange) {
	let joined = format!("{} has joined {}\n", session.label, ctx.registry.name_of(change.current));
	for peer in &change.joined {
		peer.send(&joined);
	}

	if let Some(previous) = change.previous {
		let left = format!("{} has left {}\n", session.label, ctx.registry.name_of(previous));
		for peer in &change.left {
			peer.send(&left);
		}
	}

	if let Some(room) = ctx.registry.get(change.current) {
		session.reply(&format!("{}\n", room.welcome));
	}
}
