use thiserror::Error;

/// A verb the sink recognizes. Dispatch is by verb token alone; whatever
/// follows the verb is accepted on the wire and ignored, so envelope
/// arguments are never validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
	Helo,
	Ehlo,
	Mail,
	Rcpt,
	Data,
	Rset,
	Noop,
	Vrfy,
	Etrn,
	Quit,
	StartTls,
}

impl std::fmt::Display for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Command::Helo => "HELO",
			Command::Ehlo => "EHLO",
			Command::Mail => "MAIL",
			Command::Rcpt => "RCPT",
			Command::Data => "DATA",
			Command::Rset => "RSET",
			Command::Noop => "NOOP",
			Command::Vrfy => "VRFY",
			Command::Etrn => "ETRN",
			Command::Quit => "QUIT",
			Command::StartTls => "STARTTLS",
		})
	}
}

impl std::str::FromStr for Command {
	type Err = UnknownCommand;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let verb = s.split_whitespace().next().unwrap_or("");

		match verb.to_ascii_uppercase().as_str() {
			"HELO" => Ok(Command::Helo),
			"EHLO" => Ok(Command::Ehlo),
			"MAIL" => Ok(Command::Mail),
			"RCPT" => Ok(Command::Rcpt),
			"DATA" => Ok(Command::Data),
			"RSET" => Ok(Command::Rset),
			"NOOP" => Ok(Command::Noop),
			"VRFY" => Ok(Command::Vrfy),
			"ETRN" => Ok(Command::Etrn),
			"QUIT" => Ok(Command::Quit),
			"STARTTLS" => Ok(Command::StartTls),
			_ => Err(UnknownCommand),
		}
	}
}

#[derive(Error, Debug)]
#[error("verb not implemented")]
pub struct UnknownCommand;
