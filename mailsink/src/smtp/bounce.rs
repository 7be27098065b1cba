//! The fixed table of rejection replies drawn from in bounce and random
//! modes. Never mutated after process start.

/// Reply code and text for each simulated rejection.
pub const BOUNCE_TABLE: [(u16, &str); 10] = [
	(450, "Requested mail action not taken: mailbox unavailable"),
	(451, "Requested action aborted: local error in processing"),
	(452, "Requested action not taken: insufficient system storage"),
	(458, "Unable to queue message"),
	(521, "Machine does not accept mail"),
	(550, "Requested action not taken: mailbox unavailable"),
	(551, "User not local"),
	(552, "Requested mail action aborted: exceeded storage allocation"),
	(553, "Requested action not taken: mailbox name not allowed"),
	(571, "Blocked"),
];
