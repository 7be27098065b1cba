use std::process;

use rand::Rng;
use time::OffsetDateTime;

/// Produces an identifier suitable for an RFC 2822 Message-ID header,
/// unique per call. Generated once when a session opens and again on every
/// RSET; the old value is simply discarded.
pub fn message_id(fqdn: &str) -> String {
	let seconds = OffsetDateTime::now_utc().unix_timestamp();
	let entropy: u64 = rand::thread_rng().gen();

	format!("<{}.{}.{:020}@{}>", seconds, process::id(), entropy, fqdn)
}
