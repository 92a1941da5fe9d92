#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Room name; the key used by `!room <name>`.
///
/// Names cannot contain whitespace because the command grammar splits on
/// single spaces and such a room could never be joined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
	/// Create a non-empty, whitespace-free `RoomName`.
	pub fn new(name: impl Into<String>) -> Result<Self, ParseIdError> {
		let name = name.into();
		if name.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if name.chars().any(char::is_whitespace) {
			return Err(ParseIdError::InvalidFormat(format!("room name must not contain whitespace: {name:?}")));
		}
		Ok(Self(name))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RoomName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for RoomName {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomName::new(s.to_string())
	}
}

impl TryFrom<String> for RoomName {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		RoomName::new(value)
	}
}

impl From<RoomName> for String {
	fn from(value: RoomName) -> Self {
		value.0
	}
}

/// Static room metadata, registered once at startup.
///
/// `password` and `max_clients` are carried for completeness; nothing in the
/// server enforces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
	pub name: RoomName,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub password: Option<String>,
	/// `0` means unlimited.
	#[serde(default)]
	pub max_clients: u32,
	#[serde(default)]
	pub welcome: String,
}

impl Room {
	/// Construct a room with a welcome message and empty metadata.
	pub fn new(name: RoomName, welcome: impl Into<String>) -> Self {
		Self {
			name,
			description: String::new(),
			password: None,
			max_clients: 0,
			welcome: welcome.into(),
		}
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn with_password(mut self, password: impl Into<String>) -> Self {
		self.password = Some(password.into());
		self
	}

	pub fn with_max_clients(mut self, max_clients: u32) -> Self {
		self.max_clients = max_clients;
		self
	}
}

/// Server-assigned connection identifier.
///
/// Sessions are compared by identity; two sessions never share an id even if
/// they come from the same peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}
