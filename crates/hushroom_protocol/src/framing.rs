#![forbid(unsafe_code)]

use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Every wire message ends with this byte.
pub const LINE_DELIMITER: u8 = b'\n';

/// Default maximum line length, delimiter excluded.
pub const DEFAULT_MAX_LINE_SIZE: usize = 64 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
	#[error("line exceeds maximum size: len={len} max={max}")]
	LineTooLarge {
		len: usize,
		max: usize,
	},

	#[error("payload contains the line delimiter at offset {offset}")]
	EmbeddedDelimiter {
		offset: usize,
	},
}

fn check_payload(payload: &[u8], max_line_size: usize) -> Result<(), FramingError> {
	if payload.len() > max_line_size {
		return Err(FramingError::LineTooLarge {
			len: payload.len(),
			max: max_line_size,
		});
	}

	if let Some(offset) = payload.iter().position(|b| *b == LINE_DELIMITER) {
		return Err(FramingError::EmbeddedDelimiter { offset });
	}

	Ok(())
}

/// Encode a payload into a delimited line.
pub fn encode_line(payload: &[u8], max_line_size: usize) -> Result<Vec<u8>, FramingError> {
	check_payload(payload, max_line_size)?;

	let mut out = Vec::with_capacity(payload.len() + 1);
	out.extend_from_slice(payload);
	out.push(LINE_DELIMITER);
	Ok(out)
}

/// Append an encoded line into the provided buffer.
pub fn encode_line_into(buf: &mut BytesMut, payload: &[u8], max_line_size: usize) -> Result<(), FramingError> {
	check_payload(payload, max_line_size)?;

	buf.reserve(payload.len() + 1);
	buf.put_slice(payload);
	buf.put_u8(LINE_DELIMITER);
	Ok(())
}

/// Decode a single line from the start of `src`.
///
/// Returns the line without its delimiter and the number of bytes consumed,
/// or `None` when no complete line is buffered yet.
pub fn decode_line(src: &[u8], max_line_size: usize) -> Result<Option<(&[u8], usize)>, FramingError> {
	match src.iter().position(|b| *b == LINE_DELIMITER) {
		Some(pos) if pos > max_line_size => Err(FramingError::LineTooLarge {
			len: pos,
			max: max_line_size,
		}),
		Some(pos) => Ok(Some((&src[..pos], pos + 1))),
		None if src.len() > max_line_size => Err(FramingError::LineTooLarge {
			len: src.len(),
			max: max_line_size,
		}),
		None => Ok(None),
	}
}

/// Try to split one line off the front of a growable buffer.
pub fn try_decode_line_from_buffer(buf: &mut BytesMut, max_line_size: usize) -> Result<Option<BytesMut>, FramingError> {
	let Some((line, used)) = decode_line(buf, max_line_size)? else {
		return Ok(None);
	};

	let line_len = line.len();
	let mut frame = buf.split_to(used);
	frame.truncate(line_len);
	Ok(Some(frame))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encode_appends_delimiter() {
		let line = encode_line(b"abc", DEFAULT_MAX_LINE_SIZE).expect("encode");
		assert_eq!(line, b"abc\n");
	}

	#[test]
	fn encode_rejects_embedded_delimiter() {
		let err = encode_line(b"ab\ncd", DEFAULT_MAX_LINE_SIZE).unwrap_err();
		assert_eq!(err, FramingError::EmbeddedDelimiter { offset: 2 });
	}

	#[test]
	fn encode_rejects_too_large() {
		let err = encode_line(&[b'a'; 33], 32).unwrap_err();
		match err {
			FramingError::LineTooLarge { len, max } => {
				assert_eq!(len, 33);
				assert_eq!(max, 32);
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn decode_waits_for_delimiter() {
		assert_eq!(decode_line(b"partial", DEFAULT_MAX_LINE_SIZE).expect("ok"), None);
	}

	#[test]
	fn decode_keeps_empty_lines() {
		let (line, used) = decode_line(b"\nrest", DEFAULT_MAX_LINE_SIZE).expect("ok").expect("some");
		assert!(line.is_empty());
		assert_eq!(used, 1);
	}

	#[test]
	fn try_decode_from_buffer_incremental() {
		let mut buf = BytesMut::new();

		buf.extend_from_slice(b"hel");
		assert!(try_decode_line_from_buffer(&mut buf, DEFAULT_MAX_LINE_SIZE).expect("ok").is_none());

		buf.extend_from_slice(b"lo\nwor");
		let first = try_decode_line_from_buffer(&mut buf, DEFAULT_MAX_LINE_SIZE)
			.expect("ok")
			.expect("some");
		assert_eq!(&first[..], b"hello");
		assert_eq!(&buf[..], b"wor");

		buf.extend_from_slice(b"ld\n");
		let second = try_decode_line_from_buffer(&mut buf, DEFAULT_MAX_LINE_SIZE)
			.expect("ok")
			.expect("some");
		assert_eq!(&second[..], b"world");
		assert!(buf.is_empty());
	}

	#[test]
	fn decode_rejects_unterminated_overflow() {
		let mut buf = BytesMut::from(&[b'x'; 40][..]);
		let err = try_decode_line_from_buffer(&mut buf, 32).unwrap_err();
		assert!(matches!(err, FramingError::LineTooLarge { len: 40, max: 32 }));
	}
}
