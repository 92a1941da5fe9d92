#![forbid(unsafe_code)]

//! Which room each live session is in.
//!
//! All reads and writes go through one lock, so a room switch and the
//! recipient lists it produces are computed against a single consistent view.
//! Delivery happens after the lock is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use hushroom_domain::SessionId;
use hushroom_protocol::{SessionKey, encrypt};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::server::registry::RoomIndex;

/// Outcome of a single enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	Queued,
	/// Recipient queue was full; the line was dropped.
	Dropped,
	/// Recipient writer is gone.
	Closed,
}

/// Encrypting sender for one session's outbound queue.
///
/// Lines are encrypted under the recipient's key at enqueue time and written
/// by that session's writer task.
#[derive(Debug, Clone)]
pub struct Outbox {
	id: SessionId,
	key: SessionKey,
	tx: mpsc::Sender<String>,
}

impl Outbox {
	pub fn new(id: SessionId, key: SessionKey, tx: mpsc::Sender<String>) -> Self {
		Self { id, key, tx }
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn key(&self) -> &SessionKey {
		&self.key
	}

	pub fn send(&self, plaintext: &str) -> Delivery {
		match self.tx.try_send(encrypt(&self.key, plaintext)) {
			Ok(()) => Delivery::Queued,
			Err(mpsc::error::TrySendError::Full(_)) => {
				metrics::counter!("hushroom_server_relay_dropped_total").increment(1);
				debug!(conn_id = self.id.0, "outbound queue full; dropped line");
				Delivery::Dropped
			}
			Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
		}
	}
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
	pub outbox: Outbox,
	/// Peer address, used as the sender identity in notices.
	pub label: String,
	/// Reserved; never assigned.
	pub nick: Option<String>,
	pub room: RoomIndex,
}

/// Recipients produced by a placement or a room switch.
#[derive(Debug, Clone)]
pub struct RoomChange {
	pub previous: Option<RoomIndex>,
	pub current: RoomIndex,
	/// Sessions already in `current`.
	pub joined: Vec<Outbox>,
	/// Every other session not in `current`, whatever room it is in.
	pub left: Vec<Outbox>,
}

/// Lock-free core of [`MembershipTable`].
#[derive(Debug, Default)]
pub struct MembershipState {
	sessions: BTreeMap<SessionId, SessionEntry>,
}

impl MembershipState {
	/// Place a new session. Existing members of its room are returned as
	/// `joined`; `left` is always empty.
	pub fn admit(&mut self, entry: SessionEntry) -> RoomChange {
		let id = entry.outbox.id();
		let room = entry.room;
		let joined = self.peers_in(room, id);
		self.sessions.insert(id, entry);

		RoomChange {
			previous: None,
			current: room,
			joined,
			// No prior room, so initial placement never produces a leave notice.
			left: Vec::new(),
		}
	}

	/// Move a session. Returns `None` if it is not a member.
	pub fn switch(&mut self, id: SessionId, to: RoomIndex) -> Option<RoomChange> {
		let previous = self.sessions.get(&id)?.room;

		let mut joined = Vec::new();
		let mut left = Vec::new();
		for (other, entry) in &self.sessions {
			if *other == id {
				continue;
			}
			if entry.room == to {
				joined.push(entry.outbox.clone());
			} else {
				left.push(entry.outbox.clone());
			}
		}

		if let Some(entry) = self.sessions.get_mut(&id) {
			entry.room = to;
		}

		Some(RoomChange {
			previous: Some(previous),
			current: to,
			joined,
			left,
		})
	}

	pub fn remove(&mut self, id: SessionId) -> Option<SessionEntry> {
		self.sessions.remove(&id)
	}

	pub fn room_of(&self, id: SessionId) -> Option<RoomIndex> {
		self.sessions.get(&id).map(|e| e.room)
	}

	/// Other sessions sharing `id`'s room; empty if `id` is not a member.
	pub fn room_peers(&self, id: SessionId) -> Vec<Outbox> {
		match self.room_of(id) {
			Some(room) => self.peers_in(room, id),
			None => Vec::new(),
		}
	}

	pub fn members_of(&self, room: RoomIndex) -> Vec<SessionId> {
		self.sessions
			.iter()
			.filter(|(_, e)| e.room == room)
			.map(|(id, _)| *id)
			.collect()
	}

	pub fn room_counts(&self) -> HashMap<RoomIndex, usize> {
		let mut counts = HashMap::new();
		for entry in self.sessions.values() {
			*counts.entry(entry.room).or_insert(0) += 1;
		}
		counts
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	fn peers_in(&self, room: RoomIndex, except: SessionId) -> Vec<Outbox> {
		self.sessions
			.iter()
			.filter(|(id, e)| **id != except && e.room == room)
			.map(|(_, e)| e.outbox.clone())
			.collect()
	}
}

/// Shared handle to the membership map.
#[derive(Debug, Clone, Default)]
pub struct MembershipTable {
	inner: Arc<Mutex<MembershipState>>,
}

impl MembershipTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn admit(&self, entry: SessionEntry) -> RoomChange {
		let change = self.inner.lock().await.admit(entry);
		metrics::gauge!("hushroom_server_active_sessions").increment(1.0);
		change
	}

	pub async fn switch(&self, id: SessionId, to: RoomIndex) -> Option<RoomChange> {
		self.inner.lock().await.switch(id, to)
	}

	pub async fn remove(&self, id: SessionId) -> Option<SessionEntry> {
		let removed = self.inner.lock().await.remove(id);
		if removed.is_some() {
			metrics::gauge!("hushroom_server_active_sessions").decrement(1.0);
		}
		removed
	}

	pub async fn room_of(&self, id: SessionId) -> Option<RoomIndex> {
		self.inner.lock().await.room_of(id)
	}

	pub async fn room_peers(&self, id: SessionId) -> Vec<Outbox> {
		self.inner.lock().await.room_peers(id)
	}

	pub async fn room_counts(&self) -> HashMap<RoomIndex, usize> {
		self.inner.lock().await.room_counts()
	}

	pub async fn len(&self) -> usize {
		self.inner.lock().await.len()
	}
}
