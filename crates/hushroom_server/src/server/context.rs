#![forbid(unsafe_code)]

use crate::server::connection::ConnectionSettings;
use crate::server::membership::MembershipTable;
use crate::server::registry::{RegistryError, RoomIndex, RoomRegistry};

/// State shared by every session of one server instance.
#[derive(Debug)]
pub struct ServerContext {
	pub registry: RoomRegistry,
	pub membership: MembershipTable,
	pub settings: ConnectionSettings,
	default_room: RoomIndex,
}

impl ServerContext {
	/// Fails if `registry` has no rooms; sessions need somewhere to land.
	pub fn new(registry: RoomRegistry, settings: ConnectionSettings) -> Result<Self, RegistryError> {
		let default_room = registry.default_room()?;
		Ok(Self {
			registry,
			membership: MembershipTable::new(),
			settings,
			default_room,
		})
	}

	pub fn default_room(&self) -> RoomIndex {
		self.default_room
	}
}
