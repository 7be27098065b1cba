mod binconfig;

use std::sync::Arc;

use binconfig::BinConfig;
use log::{error, info};
use tokio::{net::TcpListener, sync::watch};

#[tokio::main]
async fn main() {
	env_logger::init();

	let binconf = match BinConfig::get() {
		Some(conf) => conf,
		None => return,
	};

	let bind_address = binconf.socket_address();
	let listener = match TcpListener::bind(bind_address).await {
		Ok(listener) => listener,
		Err(err) => {
			error!("failed to bind {}: {}", bind_address, err);
			return;
		}
	};

	let config = Arc::new(binconf.into_config());
	info!(
		"listening on {} as {} in {} mode",
		bind_address, config.fqdn, config.mode
	);

	let (tx, rx) = watch::channel(false);

	let listen_task = tokio::spawn(mailsink::net::listen(listener, config, rx));
	let signal_listener = tokio::spawn(async {
		use tokio::signal::unix::{signal, SignalKind};
		let mut hangup = signal(SignalKind::hangup()).unwrap();
		let mut terminate = signal(SignalKind::terminate()).unwrap();
		tokio::select! {
			_ = tokio::signal::ctrl_c() => (),
			_ = hangup.recv() => (),
			_ = terminate.recv() => (),
		};
	});

	#[allow(unused_must_use)]
	{
		signal_listener.await;
		info!("received shutdown signal, beginning graceful shutdown...");
		tx.send(true);
		listen_task.await;
	}
}
