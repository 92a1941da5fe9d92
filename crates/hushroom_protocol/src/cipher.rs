#![forbid(unsafe_code)]

//! Per-session line cipher: AES-256 in full-block CFB mode.
//!
//! Wire form is `urlsafe_base64(iv || ciphertext)`. The mode gives
//! confidentiality only; a flipped or truncated ciphertext decrypts to
//! garbage rather than an error, except when the payload is shorter than one
//! block.

use core::fmt;

use aes::Aes256;
use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE};
use base64::engine::DecodePaddingMode;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// Session key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES block size; also the IV length.
pub const BLOCK_SIZE: usize = 16;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
	#[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
	InvalidKeyLength(usize),

	#[error("ciphertext is not url-safe base64: {0}")]
	Encoding(String),

	#[error("ciphertext too short: len={len} min={min}")]
	CiphertextTooShort {
		len: usize,
		min: usize,
	},
}

/// Symmetric key established by the handshake for one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
	/// Fresh random key from the OS RNG.
	pub fn generate() -> Self {
		let mut key = [0u8; KEY_LEN];
		OsRng.fill_bytes(&mut key);
		Self(key)
	}

	pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self(bytes)
	}

	pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
		let key: [u8; KEY_LEN] = bytes
			.try_into()
			.map_err(|_| CipherError::InvalidKeyLength(bytes.len()))?;
		Ok(Self(key))
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.0
	}
}

impl fmt::Debug for SessionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SessionKey(<redacted>)")
	}
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
pub fn encrypt(key: &SessionKey, plaintext: &str) -> String {
	let mut iv = [0u8; BLOCK_SIZE];
	OsRng.fill_bytes(&mut iv);

	let mut body = plaintext.as_bytes().to_vec();
	Aes256CfbEnc::new(key.as_bytes().into(), &iv.into()).encrypt(&mut body);

	let mut out = Vec::with_capacity(BLOCK_SIZE + body.len());
	out.extend_from_slice(&iv);
	out.extend_from_slice(&body);
	URL_SAFE.encode(out)
}

/// Decrypt a line produced by [`encrypt`].
///
/// Invalid UTF-8 in the recovered plaintext is replaced, not rejected.
pub fn decrypt(key: &SessionKey, text: &str) -> Result<String, CipherError> {
	let raw = URL_SAFE_LENIENT
		.decode(text.as_bytes())
		.map_err(|e| CipherError::Encoding(e.to_string()))?;

	if raw.len() < BLOCK_SIZE {
		return Err(CipherError::CiphertextTooShort {
			len: raw.len(),
			min: BLOCK_SIZE,
		});
	}

	let (iv, body) = raw.split_at(BLOCK_SIZE);
	let iv: [u8; BLOCK_SIZE] = iv
		.try_into()
		.map_err(|_| CipherError::CiphertextTooShort {
			len: raw.len(),
			min: BLOCK_SIZE,
		})?;

	let mut body = body.to_vec();
	Aes256CfbDec::new(key.as_bytes().into(), &iv.into()).decrypt(&mut body);

	Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_keys_are_32_bytes_and_distinct() {
		let a = SessionKey::generate();
		let b = SessionKey::generate();
		assert_eq!(a.as_bytes().len(), 32);
		assert_ne!(a, b);
	}

	#[test]
	fn from_slice_rejects_wrong_lengths() {
		assert_eq!(SessionKey::from_slice(&[0u8; 31]), Err(CipherError::InvalidKeyLength(31)));
		assert_eq!(SessionKey::from_slice(&[0u8; 33]), Err(CipherError::InvalidKeyLength(33)));
		assert!(SessionKey::from_slice(&[0u8; 32]).is_ok());
	}

	#[test]
	fn encrypt_decrypt_roundtrip() {
		let key = SessionKey::generate();
		let line = encrypt(&key, "hello room\n");
		assert_eq!(decrypt(&key, &line).expect("decrypt"), "hello room\n");
	}

	#[test]
	fn encrypt_output_is_url_safe_and_single_line() {
		let key = SessionKey::generate();
		let line = encrypt(&key, &"\u{ff}?>~".repeat(64));
		assert!(!line.contains('\n'));
		assert!(!line.contains('+'));
		assert!(!line.contains('/'));
	}

	#[test]
	fn encrypt_uses_fresh_iv_each_call() {
		let key = SessionKey::generate();
		let a = encrypt(&key, "test crypto");
		let b = encrypt(&key, "test crypto");
		assert_ne!(a, b);
		assert_ne!(a, "test crypto");
	}

	#[test]
	fn decrypt_rejects_short_ciphertext() {
		let key = SessionKey::generate();
		let short = URL_SAFE.encode([0u8; BLOCK_SIZE - 1]);
		match decrypt(&key, &short) {
			Err(CipherError::CiphertextTooShort { len, min }) => {
				assert_eq!(len, BLOCK_SIZE - 1);
				assert_eq!(min, BLOCK_SIZE);
			}
			other => panic!("unexpected result: {other:?}"),
		}
	}

	#[test]
	fn decrypt_rejects_bad_encoding() {
		let key = SessionKey::generate();
		assert!(matches!(decrypt(&key, "not base64 at all!"), Err(CipherError::Encoding(_))));
	}

	#[test]
	fn decrypt_accepts_unpadded_input() {
		let key = SessionKey::generate();
		let line = encrypt(&key, "x");
		let unpadded = line.trim_end_matches('=');
		assert_eq!(decrypt(&key, unpadded).expect("decrypt"), "x");
	}

	#[test]
	fn iv_only_ciphertext_decrypts_to_empty() {
		let key = SessionKey::from_bytes([0u8; KEY_LEN]);
		let line = URL_SAFE.encode([7u8; BLOCK_SIZE]);
		assert_eq!(decrypt(&key, &line).expect("decrypt"), "");
	}

	#[test]
	fn debug_does_not_leak_key_material() {
		let key = SessionKey::from_bytes([0xAB; KEY_LEN]);
		let dbg = format!("{key:?}");
		assert!(!dbg.contains("171"));
		assert!(dbg.contains("redacted"));
	}
}
