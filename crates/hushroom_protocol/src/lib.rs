#![forbid(unsafe_code)]

pub mod cipher;
pub mod command;
pub mod framing;
pub mod handshake;
pub mod io;

pub use cipher::{BLOCK_SIZE, CipherError, KEY_LEN, SessionKey, decrypt, encrypt};
pub use command::{Command, QUIT_SENTINEL, ROOM_COMMAND};
pub use framing::{
	DEFAULT_MAX_LINE_SIZE, FramingError, LINE_DELIMITER, decode_line, encode_line, encode_line_into,
	try_decode_line_from_buffer,
};
pub use handshake::{HANDSHAKE_MARKER, Handshake, HandshakeError, HandshakeState, KeyPair, is_frame_safe};
pub use io::{LineError, LineReader, write_line};
