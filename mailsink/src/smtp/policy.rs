use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{bounce::BOUNCE_TABLE, response::Reply};
use crate::config::Mode;

/// Uniform selection over a set of outcomes. A trait seam so tests can
/// script the draw instead of rolling dice.
pub trait Picker: Send {
	/// Returns an index in `0..n`.
	fn pick(&mut self, n: usize) -> usize;
}

/// The production picker, seeded from OS entropy once per session.
pub struct RandomPicker(StdRng);

impl RandomPicker {
	pub fn new() -> Self {
		Self(StdRng::from_entropy())
	}
}

impl Default for RandomPicker {
	fn default() -> Self {
		Self::new()
	}
}

impl Picker for RandomPicker {
	fn pick(&mut self, n: usize) -> usize {
		self.0.gen_range(0..n)
	}
}

/// Decides what a finished message is answered with, according to the
/// server mode. Consulted exactly once per DATA terminator.
pub struct ReplyPolicy {
	mode: Mode,
	picker: Box<dyn Picker>,
}

impl ReplyPolicy {
	pub fn new(mode: Mode) -> Self {
		Self::with_picker(mode, Box::new(RandomPicker::new()))
	}

	pub fn with_picker(mode: Mode, picker: Box<dyn Picker>) -> Self {
		Self { mode, picker }
	}

	/// The reply for a completed message body. `message_id` is the
	/// session's current id, embedded in the success text.
	pub fn data_reply(&mut self, message_id: &str) -> Reply {
		match self.mode {
			Mode::Accept => Self::queued(message_id),
			Mode::Bounce => Self::bounce(self.picker.pick(BOUNCE_TABLE.len())),
			// success sits alongside the ten bounce entries, all equally
			// likely
			Mode::Random => match self.picker.pick(BOUNCE_TABLE.len() + 1) {
				0 => Self::queued(message_id),
				n => Self::bounce(n - 1),
			},
		}
	}

	fn queued(message_id: &str) -> Reply {
		Reply::new(250, format!("2.0.0 OK: queued as {}", message_id))
	}

	fn bounce(index: usize) -> Reply {
		let (code, text) = BOUNCE_TABLE[index];
		Reply::new(code, text)
	}
}
