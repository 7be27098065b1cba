use std::time::Duration;

use thiserror::Error;

/// How the sink answers a message once its body has been received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
	/// Every message gets the success reply.
	Accept,
	/// Every message gets an entry from the bounce table.
	Bounce,
	/// The success reply and every bounce entry are equally likely.
	Random,
}

impl std::fmt::Display for Mode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Mode::Accept => "accept",
			Mode::Bounce => "bounce",
			Mode::Random => "random",
		})
	}
}

impl std::str::FromStr for Mode {
	type Err = ParseModeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"accept" => Ok(Mode::Accept),
			"bounce" => Ok(Mode::Bounce),
			"random" => Ok(Mode::Random),
			_ => Err(ParseModeError(s.to_owned())),
		}
	}
}

#[derive(Error, Debug)]
#[error("unknown mode '{0}', expected accept, bounce, or random")]
pub struct ParseModeError(String);

/// Run configuration, fixed at process start. Every session holds a shared
/// reference and only ever reads it.
#[derive(Clone, Debug)]
pub struct Config {
	/// The name the server identifies itself with in its greeting.
	pub fqdn: String,
	/// How long a session may wait for a complete line before it is
	/// disconnected.
	pub timeout: Duration,
	pub mode: Mode,
	/// If set, the reply to a finished message is held back this long.
	pub delay: Option<Duration>,
}
