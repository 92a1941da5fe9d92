#![forbid(unsafe_code)]

/// Plaintext that ends a session.
pub const QUIT_SENTINEL: &str = "!quit";

/// Room listing / switching command.
pub const ROOM_COMMAND: &str = "!room";

/// A decrypted client line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	Quit,
	ListRooms,
	/// Target room name exactly as typed; may name no registered room.
	JoinRoom(String),
	/// Anything else, carried unchanged (trailing newline included).
	Chat(String),
}

impl Command {
	/// Classify a decrypted line.
	///
	/// One trailing `\n` (and a `\r` before it) is ignored for matching. The
	/// first space-separated token selects the command; tokens beyond the
	/// room argument are ignored.
	pub fn parse(text: &str) -> Self {
		let trimmed = text.strip_suffix('\n').unwrap_or(text);
		let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);

		if trimmed == QUIT_SENTINEL {
			return Command::Quit;
		}

		let mut words = trimmed.split(' ');
		match words.next() {
			Some(ROOM_COMMAND) => match words.next() {
				Some(target) => Command::JoinRoom(target.to_string()),
				None => Command::ListRooms,
			},
			_ => Command::Chat(text.to_string()),
		}
	}

	/// True for lines that are never relayed to room peers.
	pub fn is_command(&self) -> bool {
		!matches!(self, Command::Chat(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quit_with_and_without_newline() {
		assert_eq!(Command::parse("!quit"), Command::Quit);
		assert_eq!(Command::parse("!quit\n"), Command::Quit);
		assert_eq!(Command::parse("!quit\r\n"), Command::Quit);
	}

	#[test]
	fn quit_must_match_exactly() {
		assert_eq!(Command::parse("!quit now\n"), Command::Chat("!quit now\n".to_string()));
		assert_eq!(Command::parse(" !quit"), Command::Chat(" !quit".to_string()));
	}

	#[test]
	fn bare_room_lists() {
		assert_eq!(Command::parse("!room\n"), Command::ListRooms);
		assert_eq!(Command::parse("!room"), Command::ListRooms);
	}

	#[test]
	fn room_with_argument_joins() {
		assert_eq!(Command::parse("!room TestRoom\n"), Command::JoinRoom("TestRoom".to_string()));
		assert_eq!(
			Command::parse("!room TestRoom extra words\n"),
			Command::JoinRoom("TestRoom".to_string())
		);
	}

	#[test]
	fn trailing_space_yields_empty_target() {
		assert_eq!(Command::parse("!room \n"), Command::JoinRoom(String::new()));
	}

	#[test]
	fn unknown_bang_tokens_are_chat() {
		let cmd = Command::parse("!rooms\n");
		assert_eq!(cmd, Command::Chat("!rooms\n".to_string()));
		assert!(!cmd.is_command());
	}

	#[test]
	fn chat_keeps_original_text() {
		assert_eq!(Command::parse("hi all\n"), Command::Chat("hi all\n".to_string()));
		assert!(Command::parse("!room").is_command());
		assert!(Command::parse("!quit").is_command());
	}
}
