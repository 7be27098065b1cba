/// A reply written back to the client: a code and one or more lines of
/// text. Multi-line replies carry the `-` continuation marker on every
/// line but the last.
pub struct Reply {
	code: u16,
	lines: Vec<String>,
}

const EHLO_CAPABILITIES: [&str; 7] = [
	"PIPELINING",
	"SIZE 512000",
	"VRFY",
	"ETRN",
	"ENHANCEDSTATUSCODES",
	"8BITMIME",
	"DSN",
];

impl Reply {
	pub fn new<S: Into<String>>(code: u16, text: S) -> Self {
		Self {
			code,
			lines: vec![text.into()],
		}
	}

	pub fn push<S: Into<String>>(&mut self, line: S) {
		self.lines.push(line.into());
	}

	pub fn code(&self) -> u16 {
		self.code
	}

	/// The banner sent as soon as a connection is accepted.
	pub fn greeting(fqdn: &str) -> Self {
		Reply::new(220, format!("{} ESMTP", fqdn))
	}

	/// The extended hello block: the hostname line, the capability list,
	/// and a final unmarked `250 DSN` line.
	pub fn ehlo(fqdn: &str) -> Self {
		let mut reply = Reply::new(250, fqdn);

		for capability in EHLO_CAPABILITIES {
			reply.push(capability);
		}

		reply
	}

	pub fn as_string(&self) -> String {
		let mut out = String::new();

		for (index, line) in self.lines.iter().enumerate() {
			let marker = if index + 1 == self.lines.len() { ' ' } else { '-' };
			out.push_str(&format!("{}{}{}\r\n", self.code, marker, line));
		}

		out
	}
}
