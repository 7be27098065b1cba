//! A discard mail sink. Speaks enough SMTP to accept, or deliberately
//! bounce, incoming mail sessions without ever delivering or storing a
//! message.

pub mod config;
pub mod net;
pub mod smtp;

pub use config::{Config, Mode};
pub use smtp::{Reply, Session, SessionError};
