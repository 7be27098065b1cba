//! Accepts inbound connections and hands each one to its own session
//! task.

use std::sync::Arc;

use log::{debug, error};
use tokio::{net::TcpListener, sync::watch};

use crate::{config::Config, smtp::Session};

/// Waits for new connections, dispatching a task per inbound connection
/// until the shutdown channel flips. A session failing, however badly,
/// never takes the listener or another session with it.
pub async fn listen(
	listener: TcpListener,
	config: Arc<Config>,
	mut shutdown: watch::Receiver<bool>,
) {
	loop {
		let accepted = tokio::select! {
			_ = shutdown.changed() => break,
			accepted = listener.accept() => accepted,
		};

		let (stream, peer) = match accepted {
			Ok(accepted) => accepted,
			Err(err) => {
				// one failed accept should not stop the listener
				error!("accept failed: {}", err);
				continue;
			}
		};

		debug!("peer {} connected", peer);

		let session = Session::new(stream, peer, config.clone(), shutdown.clone());
		tokio::spawn(session.serve());
	}

	debug!("listener stopped");
}
