use std::{
	net::{IpAddr, SocketAddr},
	time::Duration,
};

use confindent::Confindent;
use getopts::Options;
use mailsink::{Config, Mode};

pub struct BinConfig {
	pub address: IpAddr,
	pub port: u16,
	pub hostname: String,
	pub timeout: u64,
	pub mode: Mode,
	pub delay: Option<u64>,
}

#[allow(clippy::or_fun_call)]
impl BinConfig {
	fn print_usage<S: AsRef<str>>(prgm: S, opts: &Options) {
		let brief = format!("Usage: {} [options]", prgm.as_ref());
		println!("{}", opts.usage(&brief));
	}

	pub fn socket_address(&self) -> SocketAddr {
		SocketAddr::new(self.address, self.port)
	}

	pub fn into_config(self) -> Config {
		Config {
			fqdn: self.hostname,
			timeout: Duration::from_secs(self.timeout),
			mode: self.mode,
			delay: self.delay.map(Duration::from_secs),
		}
	}

	pub fn get() -> Option<Self> {
		let args: Vec<String> = std::env::args().collect();

		let mut opts = Options::new();
		opts.optflag("h", "help", "Print this help message");
		opts.optopt(
			"l",
			"listen-address",
			"The IP address mailsinkd will listen for incoming connections on\nDefault: 127.0.0.1",
			"IP_ADDR",
		);
		opts.optopt(
			"p",
			"port",
			"The port mailsinkd will listen on\nDefault: 25",
			"PORT",
		);
		opts.optopt(
			"t",
			"timeout",
			"Seconds a session may sit idle before it is disconnected\nDefault: 60",
			"SECONDS",
		);
		opts.optopt(
			"m",
			"mode",
			"How finished messages are answered: accept, bounce or random\nDefault: accept",
			"MODE",
		);
		opts.optopt(
			"d",
			"delay",
			"Seconds to hold back the reply to a finished message",
			"SECONDS",
		);
		opts.optopt(
			"n",
			"hostname",
			"The name the server greets with\nDefault: the system hostname",
			"FQDN",
		);
		opts.optopt(
			"c",
			"config",
			"An alternate location to read the config from\nDefault: /etc/mailsink/mailsink.conf",
			"PATH",
		);

		let matches = match opts.parse(&args[1..]) {
			Ok(m) => m,
			Err(_e) => return None,
		};

		if matches.opt_present("help") {
			Self::print_usage(&args[0], &opts);
			return None;
		}

		// An explicitly named config file has to load; the default
		// locations are optional, the sink runs fine on pure defaults.
		let config = match matches.opt_str("config") {
			Some(path) => match Confindent::from_file(&path) {
				Ok(c) => Some(c),
				Err(err) => {
					eprintln!("failed to parse conf file {}: {}", path, err);
					return None;
				}
			},
			None => Confindent::from_file("/etc/mailsink/mailsink.conf")
				.or_else(|_| Confindent::from_file("mailsink.conf"))
				.ok(),
		};

		// Options specified on the command line take priority. We only take the
		// cli_key and convert to the config key internally so that we can remain
		// consistent.
		let find_value = |cli_key: &str| -> Option<String> {
			let conf_key: String = cli_key
				.split('-')
				.map(|word| {
					// https://stackoverflow.com/a/38406885
					let mut c = word.chars();
					match c.next() {
						None => String::new(),
						Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
					}
				})
				.collect();

			matches.opt_str(cli_key).or(config
				.as_ref()
				.and_then(|conf| conf.child_value(conf_key).map(|s| s.into())))
		};

		let address_string = find_value("listen-address").unwrap_or("127.0.0.1".into());
		let address = match address_string.parse() {
			Ok(addr) => addr,
			Err(_e) => {
				eprintln!("Failed to parse '{}' as an IP Address", address_string);
				return None;
			}
		};

		let port_string = find_value("port").unwrap_or("25".into());
		let port = match port_string.parse() {
			Ok(p) => p,
			Err(_e) => {
				eprintln!("Failed to parse '{}' as a port", port_string);
				return None;
			}
		};

		let timeout_string = find_value("timeout").unwrap_or("60".into());
		let timeout = match timeout_string.parse() {
			Ok(t) => t,
			Err(_e) => {
				eprintln!("Failed to parse '{}' as a timeout in seconds", timeout_string);
				return None;
			}
		};

		let mode_string = find_value("mode").unwrap_or("accept".into());
		let mode = match mode_string.parse() {
			Ok(m) => m,
			Err(err) => {
				eprintln!("{}", err);
				return None;
			}
		};

		let delay = match find_value("delay") {
			None => None,
			Some(delay_string) => match delay_string.parse() {
				Ok(d) => Some(d),
				Err(_e) => {
					eprintln!("Failed to parse '{}' as a delay in seconds", delay_string);
					return None;
				}
			},
		};

		let hostname = find_value("hostname")
			.unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());

		Some(Self {
			address,
			port,
			hostname,
			timeout,
			mode,
			delay,
		})
	}
}
