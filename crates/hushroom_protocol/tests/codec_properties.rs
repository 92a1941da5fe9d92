use bytes::BytesMut;
use hushroom_protocol::{
	BLOCK_SIZE, Command, DEFAULT_MAX_LINE_SIZE, Handshake, KeyPair, LINE_DELIMITER, SessionKey, decrypt, encrypt,
	encode_line, is_frame_safe, try_decode_line_from_buffer,
};
use proptest::prelude::*;

proptest! {
	#![proptest_config(ProptestConfig::with_cases(64))]

	#[test]
	fn decrypt_inverts_encrypt(key_bytes in any::<[u8; 32]>(), text in ".*") {
		let key = SessionKey::from_bytes(key_bytes);
		let line = encrypt(&key, &text);
		prop_assert!(!line.contains('\n'));
		prop_assert_eq!(decrypt(&key, &line).expect("decrypt"), text);
	}

	#[test]
	fn encrypted_lines_survive_framing(text in ".{0,256}") {
		let key = SessionKey::generate();
		let line = encode_line(encrypt(&key, &text).as_bytes(), DEFAULT_MAX_LINE_SIZE).expect("frame");

		let mut buf = BytesMut::from(&line[..]);
		let payload = try_decode_line_from_buffer(&mut buf, DEFAULT_MAX_LINE_SIZE)
			.expect("decode")
			.expect("complete line");
		let payload = std::str::from_utf8(&payload).expect("base64 is ascii");

		prop_assert_eq!(decrypt(&key, payload).expect("decrypt"), text);
		prop_assert!(buf.is_empty());
	}

	#[test]
	fn wrong_key_never_errors_on_well_formed_input(text in ".{1,64}") {
		// No integrity: the wrong key silently produces some other plaintext.
		let line = encrypt(&SessionKey::generate(), &text);
		prop_assert!(decrypt(&SessionKey::generate(), &line).is_ok());
	}

	#[test]
	fn chat_lines_keep_their_text(text in "[a-z][a-z ]{0,40}\n") {
		prop_assert_eq!(Command::parse(&text), Command::Chat(text.clone()));
	}
}

#[test]
fn generated_public_keys_are_frame_safe() {
	for _ in 0..256 {
		let pair = KeyPair::generate();
		let public = pair.public_bytes();
		assert!(is_frame_safe(public));
		assert!(!public.contains(&LINE_DELIMITER));
		assert!(!public.contains(&b's'));
	}
}

#[test]
fn handshake_lines_are_single_frames() {
	for _ in 0..64 {
		let hs = Handshake::new();
		let line = hs.public_line();
		let mut buf = BytesMut::from(&line[..]);
		let frame = try_decode_line_from_buffer(&mut buf, DEFAULT_MAX_LINE_SIZE)
			.expect("decode")
			.expect("complete line");
		assert_eq!(frame.len(), line.len() - 1);
		assert!(buf.is_empty());
	}
}

#[test]
fn flipped_ciphertext_decrypts_to_garbage_not_error() {
	use base64::Engine as _;
	use base64::engine::general_purpose::URL_SAFE;

	let key = SessionKey::generate();
	let line = encrypt(&key, "attack at dawn");

	let mut raw = URL_SAFE.decode(&line).expect("decode");
	raw[BLOCK_SIZE] ^= 0x01;
	let tampered = URL_SAFE.encode(&raw);

	let out = decrypt(&key, &tampered).expect("no integrity check");
	assert_ne!(out, "attack at dawn");
}

#[test]
fn truncated_ciphertext_decrypts_to_prefix_garbage() {
	use base64::Engine as _;
	use base64::engine::general_purpose::URL_SAFE;

	let key = SessionKey::generate();
	let line = encrypt(&key, "attack at dawn");
	let mut raw = URL_SAFE.decode(&line).expect("decode");
	raw.truncate(BLOCK_SIZE + 6);

	let out = decrypt(&key, &URL_SAFE.encode(&raw)).expect("no integrity check");
	assert_eq!(out, "attack");
}
