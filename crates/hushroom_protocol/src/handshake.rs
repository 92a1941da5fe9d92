#![forbid(unsafe_code)]

//! Per-connection key agreement.
//!
//! Both ends send `HANDSHAKE_MARKER || raw x25519 public key || '\n'`. Lines
//! that do not start with the marker are ignored until the peer key arrives;
//! the 32-byte shared secret becomes the [`SessionKey`].

use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::cipher::{KEY_LEN, SessionKey};
use crate::framing::LINE_DELIMITER;

/// Fixed prefix marking key-exchange lines.
pub const HANDSHAKE_MARKER: &str = "ssd990=+?¡][ªs)(sdª]ßð=S)]";

const MARKER_LEAD: u8 = HANDSHAKE_MARKER.as_bytes()[0];

/// Raw x25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
	#[error("invalid peer public key length: expected {PUBLIC_KEY_LEN} bytes, got {0}")]
	InvalidPeerKey(usize),

	#[error("peer public key produced a non-contributory shared secret")]
	WeakPeerKey,

	#[error("handshake already established")]
	AlreadyEstablished,
}

/// True when `bytes` can ride inside a handshake line unescaped.
pub fn is_frame_safe(bytes: &[u8]) -> bool {
	!bytes.iter().any(|b| *b == LINE_DELIMITER || *b == MARKER_LEAD)
}

/// Returns the key material of a handshake line, or `None` if the line is not
/// a handshake line (missing marker or empty payload).
pub fn parse_handshake_line(line: &[u8]) -> Option<&[u8]> {
	let payload = line.strip_prefix(HANDSHAKE_MARKER.as_bytes())?;
	if payload.is_empty() { None } else { Some(payload) }
}

/// Ephemeral key pair whose public encoding is frame safe.
pub struct KeyPair {
	secret: EphemeralSecret,
	public: PublicKey,
}

impl KeyPair {
	/// Generate key pairs until the public key is frame safe.
	pub fn generate() -> Self {
		loop {
			let secret = EphemeralSecret::random_from_rng(OsRng);
			let public = PublicKey::from(&secret);
			if is_frame_safe(public.as_bytes()) {
				return Self { secret, public };
			}
		}
	}

	pub fn public_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
		self.public.as_bytes()
	}

	/// Combine with the peer's public key; the first 32 bytes of the shared
	/// secret are the session key.
	pub fn derive(self, peer_public: &[u8]) -> Result<SessionKey, HandshakeError> {
		let peer: [u8; PUBLIC_KEY_LEN] = peer_public
			.try_into()
			.map_err(|_| HandshakeError::InvalidPeerKey(peer_public.len()))?;

		let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
		if !shared.was_contributory() {
			return Err(HandshakeError::WeakPeerKey);
		}

		let mut key = [0u8; KEY_LEN];
		key.copy_from_slice(&shared.as_bytes()[..KEY_LEN]);
		Ok(SessionKey::from_bytes(key))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
	AwaitingPeerKey,
	Established,
}

/// Handshake driver for one connection. Used identically by both ends; only
/// the order of sending [`Handshake::public_line`] differs.
pub struct Handshake {
	keypair: Option<KeyPair>,
	public: [u8; PUBLIC_KEY_LEN],
}

impl Handshake {
	pub fn new() -> Self {
		let keypair = KeyPair::generate();
		let public = *keypair.public_bytes();
		Self {
			keypair: Some(keypair),
			public,
		}
	}

	pub fn state(&self) -> HandshakeState {
		if self.keypair.is_some() {
			HandshakeState::AwaitingPeerKey
		} else {
			HandshakeState::Established
		}
	}

	pub fn public_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
		&self.public
	}

	/// The full handshake line to send, delimiter included.
	pub fn public_line(&self) -> Vec<u8> {
		let marker = HANDSHAKE_MARKER.as_bytes();
		let mut out = Vec::with_capacity(marker.len() + PUBLIC_KEY_LEN + 1);
		out.extend_from_slice(marker);
		out.extend_from_slice(&self.public);
		out.push(LINE_DELIMITER);
		out
	}

	/// Feed one received line (delimiter stripped).
	///
	/// Non-handshake lines yield `Ok(None)` and leave the state unchanged.
	pub fn receive_line(&mut self, line: &[u8]) -> Result<Option<SessionKey>, HandshakeError> {
		let Some(peer) = parse_handshake_line(line) else {
			return Ok(None);
		};

		let keypair = self.keypair.take().ok_or(HandshakeError::AlreadyEstablished)?;
		keypair.derive(peer).map(Some)
	}
}

impl Default for Handshake {
	fn default() -> Self {
		Self::new()
	}
}
