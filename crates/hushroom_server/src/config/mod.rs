#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use hushroom_domain::{Room, RoomName};
use hushroom_protocol::DEFAULT_MAX_LINE_SIZE;
use serde::Deserialize;
use tracing::{info, warn};

use crate::server::registry::default_rooms;

/// Default handshake deadline; `0` in config or env disables it.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// Default per-session outbound queue depth.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Default config path: `~/.hushroom/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".hushroom").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg)?;

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub server: ServerSettings,
	/// Rooms in registration order; the first one is where new sessions land.
	pub rooms: Vec<Room>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			server: ServerSettings::default(),
			rooms: default_rooms(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// Listen endpoint (`tcp://host:port`); the CLI flag wins over this.
	pub bind: Option<String>,
	/// Deadline for the peer's handshake line. `None` waits forever.
	pub handshake_timeout: Option<Duration>,
	/// Longest accepted wire line, delimiter excluded.
	pub max_line_bytes: usize,
	pub outbound_queue_capacity: usize,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Optional health/readiness HTTP bind address (host:port).
	pub health_bind: Option<String>,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			bind: None,
			handshake_timeout: Some(Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS)),
			max_line_bytes: DEFAULT_MAX_LINE_SIZE,
			outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
			metrics_bind: None,
			health_bind: None,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	rooms: Vec<FileRoom>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileServerSettings {
	bind: Option<String>,
	handshake_timeout_secs: Option<u64>,
	max_line_bytes: Option<usize>,
	outbound_queue_capacity: Option<usize>,
	metrics_bind: Option<String>,
	health_bind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRoom {
	name: String,
	#[serde(default)]
	description: String,
	password: Option<String>,
	#[serde(default)]
	max_clients: u32,
	welcome: Option<String>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let defaults = ServerSettings::default();

		let server = ServerSettings {
			bind: file.server.bind.filter(|s| !s.trim().is_empty()),
			handshake_timeout: match file.server.handshake_timeout_secs {
				Some(secs) => timeout_from_secs(secs),
				None => defaults.handshake_timeout,
			},
			max_line_bytes: file
				.server
				.max_line_bytes
				.filter(|v| *v > 0)
				.unwrap_or(defaults.max_line_bytes),
			outbound_queue_capacity: file
				.server
				.outbound_queue_capacity
				.filter(|v| *v > 0)
				.unwrap_or(defaults.outbound_queue_capacity),
			metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
			health_bind: file.server.health_bind.filter(|s| !s.trim().is_empty()),
		};

		let rooms = if file.rooms.is_empty() {
			default_rooms()
		} else {
			file.rooms
				.into_iter()
				.map(FileRoom::into_room)
				.collect::<anyhow::Result<Vec<_>>>()?
		};

		Ok(Self { server, rooms })
	}
}

impl FileRoom {
	fn into_room(self) -> anyhow::Result<Room> {
		let name = RoomName::new(self.name.trim()).with_context(|| format!("invalid room name {:?}", self.name))?;
		let welcome = self.welcome.unwrap_or_else(|| format!("Welcome to {name}"));

		let mut room = Room::new(name, welcome)
			.with_description(self.description)
			.with_max_clients(self.max_clients);
		if let Some(password) = self.password.filter(|s| !s.is_empty()) {
			room = room.with_password(password);
		}
		Ok(room)
	}
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
	(secs > 0).then(|| Duration::from_secs(secs))
}

fn env_value(name: &str) -> Option<String> {
	std::env::var(name)
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
}

fn apply_env_overrides(cfg: &mut ServerConfig) {
	if let Some(v) = env_value("HUSHROOM_BIND") {
		cfg.server.bind = Some(v);
		info!("server: bind overridden by env");
	}

	if let Some(v) = env_value("HUSHROOM_HANDSHAKE_TIMEOUT_SECS") {
		match v.parse::<u64>() {
			Ok(secs) => {
				cfg.server.handshake_timeout = timeout_from_secs(secs);
				info!("server: handshake_timeout overridden by env");
			}
			Err(e) => warn!(error = %e, value = %v, "ignoring invalid HUSHROOM_HANDSHAKE_TIMEOUT_SECS"),
		}
	}

	if let Some(v) = env_value("HUSHROOM_MAX_LINE_BYTES") {
		match v.parse::<usize>() {
			Ok(n) if n > 0 => {
				cfg.server.max_line_bytes = n;
				info!("server: max_line_bytes overridden by env");
			}
			_ => warn!(value = %v, "ignoring invalid HUSHROOM_MAX_LINE_BYTES"),
		}
	}

	if let Some(v) = env_value("HUSHROOM_OUTBOUND_QUEUE_CAPACITY") {
		match v.parse::<usize>() {
			Ok(n) if n > 0 => {
				cfg.server.outbound_queue_capacity = n;
				info!("server: outbound_queue_capacity overridden by env");
			}
			_ => warn!(value = %v, "ignoring invalid HUSHROOM_OUTBOUND_QUEUE_CAPACITY"),
		}
	}

	if let Some(v) = env_value("HUSHROOM_METRICS_BIND") {
		cfg.server.metrics_bind = Some(v);
		info!("server: metrics_bind overridden by env");
	}

	if let Some(v) = env_value("HUSHROOM_HEALTH_BIND") {
		cfg.server.health_bind = Some(v);
		info!("server: health_bind overridden by env");
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}
