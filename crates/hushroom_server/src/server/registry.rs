#![forbid(unsafe_code)]

use std::fmt::Write as _;

use hushroom_domain::{Room, RoomName};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
	#[error("room registry is empty; at least one room is required")]
	Empty,
}

/// Position of a room in the registry. Stable for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomIndex(usize);

impl RoomIndex {
	pub fn get(self) -> usize {
		self.0
	}
}

/// Rooms a fresh server starts with.
pub fn default_rooms() -> Vec<Room> {
	["Lobby", "TestRoom"]
		.into_iter()
		.filter_map(|name| RoomName::new(name).ok())
		.map(|name| {
			let welcome = format!("Welcome to {name}");
			Room::new(name, welcome)
		})
		.collect()
}

/// Append-only, ordered set of rooms. Index 0 is the default room.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
	rooms: Vec<Room>,
}

impl RoomRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_default_rooms() -> Self {
		Self::from_rooms(default_rooms())
	}

	pub fn from_rooms(rooms: impl IntoIterator<Item = Room>) -> Self {
		let mut registry = Self::new();
		for room in rooms {
			registry.register(room);
		}
		registry
	}

	/// Append a room. Duplicate names are kept; lookups resolve to the first.
	pub fn register(&mut self, room: Room) -> RoomIndex {
		if self.find(room.name.as_str()).is_some() {
			warn!(room = %room.name, "duplicate room name registered; later entry is unreachable by name");
		}
		self.rooms.push(room);
		RoomIndex(self.rooms.len() - 1)
	}

	pub fn default_room(&self) -> Result<RoomIndex, RegistryError> {
		if self.rooms.is_empty() {
			Err(RegistryError::Empty)
		} else {
			Ok(RoomIndex(0))
		}
	}

	pub fn get(&self, idx: RoomIndex) -> Option<&Room> {
		self.rooms.get(idx.0)
	}

	/// Exact, case-sensitive name lookup.
	pub fn find(&self, name: &str) -> Option<RoomIndex> {
		self.rooms.iter().position(|r| r.name.as_str() == name).map(RoomIndex)
	}

	pub fn name_of(&self, idx: RoomIndex) -> &str {
		self.get(idx).map(|r| r.name.as_str()).unwrap_or_default()
	}

	pub fn iter(&self) -> impl Iterator<Item = (RoomIndex, &Room)> {
		self.rooms.iter().enumerate().map(|(i, r)| (RoomIndex(i), r))
	}

	/// One ` - name\n` line per room, in registration order.
	pub fn listing(&self) -> String {
		let mut out = String::new();
		for room in &self.rooms {
			let _ = writeln!(out, " - {}", room.name);
		}
		out
	}

	pub fn len(&self) -> usize {
		self.rooms.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rooms.is_empty()
	}
}
