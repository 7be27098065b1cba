use std::{io, mem, net::SocketAddr, sync::Arc};

use log::debug;
use thiserror::Error;
use tokio::{
	io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf},
	sync::watch,
	time::{sleep, timeout},
};

use super::{
	command::{Command, UnknownCommand},
	id,
	policy::ReplyPolicy,
	response::Reply,
};
use crate::config::Config;

/// One accepted connection. Owns both halves of its transport and all of
/// its per-connection state; nothing in here is shared with any other
/// session.
pub struct Session<S> {
	reader: BufReader<ReadHalf<S>>,
	writer: WriteHalf<S>,
	peer: SocketAddr,
	config: Arc<Config>,
	policy: ReplyPolicy,
	message_id: String,
	shutdown: watch::Receiver<bool>,
	closed: bool,
}

/// The ways a session stops reading. Everything here is confined to the
/// one session it happened on.
#[derive(Error, Debug)]
pub enum SessionError {
	/// No complete line arrived inside the configured deadline.
	#[error("no data received before the idle deadline")]
	IdleTimeout,
	/// The client went away; nothing more can be read or written.
	#[error("connection closed by client")]
	ConnectionClosed,
	/// The process is winding down and the session must too.
	#[error("server shutting down")]
	ShuttingDown,
	#[error(transparent)]
	Io(#[from] io::Error),
}

impl<S: AsyncRead + AsyncWrite> Session<S> {
	pub fn new(
		stream: S,
		peer: SocketAddr,
		config: Arc<Config>,
		shutdown: watch::Receiver<bool>,
	) -> Self {
		let (read, writer) = tokio::io::split(stream);
		let message_id = id::message_id(&config.fqdn);
		let policy = ReplyPolicy::new(config.mode);

		Self {
			reader: BufReader::new(read),
			writer,
			peer,
			config,
			policy,
			message_id,
			shutdown,
			closed: false,
		}
	}

	/// Runs the session to completion. Every exit path, expected or not,
	/// converges on the one idempotent close below.
	pub async fn serve(mut self) {
		match self.run().await {
			Ok(()) => debug!("{} quit", self.peer),
			Err(SessionError::IdleTimeout) => {
				debug!(
					"{} timed out, no data received for {:?}",
					self.peer, self.config.timeout
				);
				let _ = self.send(&Reply::new(421, "Timeout")).await;
			}
			Err(SessionError::ShuttingDown) => {
				let reply = Reply::new(
					421,
					format!("{} Service closing transmission channel", self.config.fqdn),
				);
				let _ = self.send(&reply).await;
			}
			Err(SessionError::ConnectionClosed) => debug!("{} disconnected", self.peer),
			Err(SessionError::Io(err)) => debug!("{} transport error: {}", self.peer, err),
		}

		self.close().await;
	}

	async fn run(&mut self) -> Result<(), SessionError> {
		self.send(&Reply::greeting(&self.config.fqdn)).await?;

		loop {
			let line = self.next_line().await?;

			// a blank line is answered with nothing at all
			if line.split_whitespace().next().is_none() {
				continue;
			}

			let command = match line.parse::<Command>() {
				Ok(command) => command,
				Err(UnknownCommand) => {
					self.send(&Reply::new(500, "Not implemented")).await?;
					continue;
				}
			};

			debug!("{} dispatch {}", self.peer, command);

			match command {
				Command::Helo => self.send(&Reply::new(250, "OK")).await?,
				Command::Ehlo => self.send(&Reply::ehlo(&self.config.fqdn)).await?,
				Command::Mail => self.send(&Reply::new(250, "2.1.0 OK")).await?,
				Command::Rcpt => self.send(&Reply::new(250, "2.1.5 OK")).await?,
				Command::Data => self.data().await?,
				Command::Rset => self.rset().await?,
				Command::Noop => self.send(&Reply::new(250, "2.0.0 OK")).await?,
				Command::Vrfy => self.send(&Reply::new(252, "2.0.0 OK")).await?,
				Command::Etrn => self.send(&Reply::new(250, "Queueing started")).await?,
				Command::Quit => {
					self.send(&Reply::new(221, "2.0.0 Goodbye")).await?;
					return Ok(());
				}
				// TLS upgrade is deliberately absent; a deployment that
				// needs it must terminate TLS in front of this server
				Command::StartTls => self.send(&Reply::new(500, "Not implemented")).await?,
			}
		}
	}

	/// The DATA sub-protocol: consume and discard body lines until the
	/// terminator. Only a line that is exactly `.` ends the body; `..`
	/// and `. ` are body content like anything else.
	async fn data(&mut self) -> Result<(), SessionError> {
		self.send(&Reply::new(354, "End data with <CR><LF>.<CR><LF>"))
			.await?;

		loop {
			let line = self.next_line().await?;

			if line == "." {
				break;
			}
		}

		if let Some(delay) = self.config.delay {
			sleep(delay).await;
		}

		let reply = self.policy.data_reply(&self.message_id);
		self.send(&reply).await
	}

	async fn rset(&mut self) -> Result<(), SessionError> {
		let old = mem::replace(&mut self.message_id, id::message_id(&self.config.fqdn));
		debug!("{} message id {} is now {}", self.peer, old, self.message_id);

		self.send(&Reply::new(250, "2.0.0 OK")).await
	}

	/// Reads one line, bounded by the configured idle deadline. The
	/// command loop and the DATA loop both read through here, so the
	/// timeout semantics cannot diverge between them.
	async fn next_line(&mut self) -> Result<String, SessionError> {
		let mut buf = Vec::new();

		let read = tokio::select! {
			read = timeout(self.config.timeout, self.reader.read_until(b'\n', &mut buf)) => {
				read.map_err(|_| SessionError::IdleTimeout)??
			}
			_ = self.shutdown.changed() => return Err(SessionError::ShuttingDown),
		};

		if read == 0 {
			return Err(SessionError::ConnectionClosed);
		}

		// bytes that do not decode cleanly become a verb nothing matches,
		// worth a 500 but never a dead process
		let line = String::from_utf8_lossy(&buf);
		let line = strip_line_ending(&line);
		debug!("{} RECV {:?}", self.peer, line);

		Ok(line.to_owned())
	}

	/// Writes and flushes a reply. Writes are drained before the caller
	/// proceeds, so a slow client stalls only its own session.
	async fn send(&mut self, reply: &Reply) -> Result<(), SessionError> {
		let wire = reply.as_string();
		debug!("{} SEND {:?}", self.peer, wire);

		self.writer.write_all(wire.as_bytes()).await?;
		self.writer.flush().await?;

		Ok(())
	}

	/// Releases the transport. Safe to call more than once; only the
	/// first call touches the stream.
	async fn close(&mut self) {
		if self.closed {
			return;
		}

		self.closed = true;
		debug!("{} closing connection", self.peer);
		let _ = self.writer.shutdown().await;
	}
}

fn strip_line_ending(line: &str) -> &str {
	line.strip_suffix("\r\n")
		.or_else(|| line.strip_suffix('\n'))
		.unwrap_or(line)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		config::{Config, Mode},
		smtp::bounce::BOUNCE_TABLE,
	};
	use std::time::Duration;
	use tokio::{
		io::{duplex, AsyncWriteExt, DuplexStream},
		time::Instant,
	};

	struct Client {
		reader: BufReader<ReadHalf<DuplexStream>>,
		writer: WriteHalf<DuplexStream>,
	}

	impl Client {
		async fn send(&mut self, line: &str) {
			self.writer.write_all(line.as_bytes()).await.unwrap();
			self.writer.write_all(b"\r\n").await.unwrap();
		}

		async fn raw(&mut self, bytes: &[u8]) {
			self.writer.write_all(bytes).await.unwrap();
		}

		async fn line(&mut self) -> String {
			let mut line = String::new();
			self.reader.read_line(&mut line).await.unwrap();
			line.trim_end().to_owned()
		}

		async fn eof(&mut self) {
			let mut line = String::new();
			let read = self.reader.read_line(&mut line).await.unwrap();
			assert_eq!(read, 0, "expected eof, got {:?}", line);
		}
	}

	fn config(mode: Mode) -> Config {
		Config {
			fqdn: "mail.example.test".into(),
			timeout: Duration::from_secs(5),
			mode,
			delay: None,
		}
	}

	fn sink(config: Config) -> (Client, watch::Sender<bool>) {
		let (client_stream, server_stream) = duplex(4096);
		let (tx, rx) = watch::channel(false);
		let peer = "203.0.113.9:49152".parse().unwrap();

		let session = Session::new(server_stream, peer, Arc::new(config), rx);
		tokio::spawn(session.serve());

		let (read, writer) = tokio::io::split(client_stream);
		let client = Client {
			reader: BufReader::new(read),
			writer,
		};

		(client, tx)
	}

	/// Walks HELO/MAIL/RCPT/DATA/. and returns the id out of the success
	/// reply.
	async fn deliver_one(client: &mut Client) -> String {
		client.send("MAIL FROM:<sender@example.test>").await;
		assert_eq!(client.line().await, "250 2.1.0 OK");
		client.send("RCPT TO:<rcpt@example.test>").await;
		assert_eq!(client.line().await, "250 2.1.5 OK");
		client.send("DATA").await;
		assert_eq!(client.line().await, "354 End data with <CR><LF>.<CR><LF>");
		client.send("Subject: discarded").await;
		client.send("").await;
		client.send("body").await;
		client.send(".").await;

		let reply = client.line().await;
		let (status, id) = reply
			.split_once("queued as ")
			.expect("not a success reply");
		assert_eq!(status, "250 2.0.0 OK: ");

		id.to_owned()
	}

	#[tokio::test]
	async fn greets_on_connect() {
		let (mut client, _tx) = sink(config(Mode::Accept));

		assert_eq!(client.line().await, "220 mail.example.test ESMTP");
	}

	#[tokio::test]
	async fn answers_the_verb_table() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.send("HELO client.example.test").await;
		assert_eq!(client.line().await, "250 OK");

		client.send("MAIL FROM:<a@b.com>").await;
		assert_eq!(client.line().await, "250 2.1.0 OK");

		client.send("RCPT TO:<c@d.com>").await;
		assert_eq!(client.line().await, "250 2.1.5 OK");

		client.send("NOOP").await;
		assert_eq!(client.line().await, "250 2.0.0 OK");

		client.send("VRFY someone").await;
		assert_eq!(client.line().await, "252 2.0.0 OK");

		client.send("ETRN example.test").await;
		assert_eq!(client.line().await, "250 Queueing started");

		client.send("RSET").await;
		assert_eq!(client.line().await, "250 2.0.0 OK");

		client.send("STARTTLS").await;
		assert_eq!(client.line().await, "500 Not implemented");

		client.send("EXPN list").await;
		assert_eq!(client.line().await, "500 Not implemented");
	}

	#[tokio::test]
	async fn verbs_match_in_any_case() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.send("helo lower.example.test").await;
		assert_eq!(client.line().await, "250 OK");

		client.send("nOoP").await;
		assert_eq!(client.line().await, "250 2.0.0 OK");

		client.send("bOgUs").await;
		assert_eq!(client.line().await, "500 Not implemented");
	}

	#[tokio::test]
	async fn ehlo_lists_capabilities() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.send("EHLO client.example.test").await;
		assert_eq!(client.line().await, "250-mail.example.test");
		assert_eq!(client.line().await, "250-PIPELINING");
		assert_eq!(client.line().await, "250-SIZE 512000");
		assert_eq!(client.line().await, "250-VRFY");
		assert_eq!(client.line().await, "250-ETRN");
		assert_eq!(client.line().await, "250-ENHANCEDSTATUSCODES");
		assert_eq!(client.line().await, "250-8BITMIME");
		assert_eq!(client.line().await, "250 DSN");
	}

	#[tokio::test]
	async fn data_terminates_only_on_a_lone_dot() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.send("DATA").await;
		assert_eq!(client.line().await, "354 End data with <CR><LF>.<CR><LF>");

		// near misses must be swallowed as body content
		client.send("..").await;
		client.send(". ").await;
		client.send(".trailer").await;
		client.send(".").await;

		let reply = client.line().await;
		assert!(
			reply.starts_with("250 2.0.0 OK: queued as <"),
			"unexpected reply {:?}",
			reply
		);

		// and the session is back in the command loop afterwards
		client.send("NOOP").await;
		assert_eq!(client.line().await, "250 2.0.0 OK");
	}

	#[tokio::test]
	async fn rset_rotates_the_message_id() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		let first = deliver_one(&mut client).await;
		let again = deliver_one(&mut client).await;
		// no RSET in between: the id stays put
		assert_eq!(first, again);

		client.send("RSET").await;
		assert_eq!(client.line().await, "250 2.0.0 OK");

		let rotated = deliver_one(&mut client).await;
		assert_ne!(first, rotated);
		assert!(rotated.ends_with("@mail.example.test>"));
	}

	#[tokio::test]
	async fn quit_says_goodbye_and_closes() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.send("QUIT").await;
		assert_eq!(client.line().await, "221 2.0.0 Goodbye");
		client.eof().await;
	}

	#[tokio::test]
	async fn blank_lines_are_ignored() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.send("").await;
		client.send("   ").await;
		client.send("NOOP").await;
		assert_eq!(client.line().await, "250 2.0.0 OK");
	}

	#[tokio::test]
	async fn undecodable_bytes_cost_a_500_not_the_session() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.raw(b"\xff\xfe bogus\r\n").await;
		assert_eq!(client.line().await, "500 Not implemented");

		client.send("NOOP").await;
		assert_eq!(client.line().await, "250 2.0.0 OK");
	}

	#[tokio::test(start_paused = true)]
	async fn idle_command_loop_times_out() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		assert_eq!(client.line().await, "421 Timeout");
		client.eof().await;
	}

	#[tokio::test(start_paused = true)]
	async fn idle_data_loop_times_out() {
		let (mut client, _tx) = sink(config(Mode::Accept));
		client.line().await;

		client.send("DATA").await;
		assert_eq!(client.line().await, "354 End data with <CR><LF>.<CR><LF>");
		client.send("half a body").await;

		assert_eq!(client.line().await, "421 Timeout");
		client.eof().await;
	}

	#[tokio::test]
	async fn shutdown_signal_answers_421() {
		let (mut client, tx) = sink(config(Mode::Accept));
		client.line().await;

		tx.send(true).unwrap();
		assert_eq!(
			client.line().await,
			"421 mail.example.test Service closing transmission channel"
		);
		client.eof().await;
	}

	#[tokio::test]
	async fn bounce_mode_draws_from_the_table() {
		let (mut client, _tx) = sink(config(Mode::Bounce));
		client.line().await;

		client.send("DATA").await;
		client.line().await;
		client.send(".").await;

		let reply = client.line().await;
		let (code, text) = reply.split_once(' ').unwrap();
		let code: u16 = code.parse().unwrap();
		let entry = BOUNCE_TABLE
			.iter()
			.find(|(table_code, _)| *table_code == code)
			.unwrap_or_else(|| panic!("code {} is not in the table", code));
		assert_eq!(text, entry.1);
	}

	#[tokio::test(start_paused = true)]
	async fn delay_defers_the_completion_reply() {
		let mut delayed = config(Mode::Accept);
		delayed.delay = Some(Duration::from_secs(2));
		let (mut client, _tx) = sink(delayed);
		client.line().await;

		client.send("DATA").await;
		client.line().await;
		client.send(".").await;

		let before = Instant::now();
		let reply = client.line().await;
		assert!(reply.starts_with("250 2.0.0 OK: queued as"));
		assert!(Instant::now() - before >= Duration::from_secs(2));
	}

	#[tokio::test(start_paused = true)]
	async fn delay_suspends_only_its_own_session() {
		let mut delayed = config(Mode::Accept);
		delayed.delay = Some(Duration::from_secs(2));
		let (mut slow, _slow_tx) = sink(delayed);
		let (mut fast, _fast_tx) = sink(config(Mode::Accept));
		slow.line().await;
		fast.line().await;

		slow.send("DATA").await;
		slow.line().await;
		slow.send(".").await;

		// the delayed reply must not hold up the other session
		let before = Instant::now();
		fast.send("NOOP").await;
		assert_eq!(fast.line().await, "250 2.0.0 OK");
		assert!(Instant::now() - before < Duration::from_secs(2));

		let reply = slow.line().await;
		assert!(reply.starts_with("250 2.0.0 OK: queued as"));
	}
}
