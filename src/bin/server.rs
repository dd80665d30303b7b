use std::net;
use std::path::PathBuf;
use std::time::Duration;

use log::info;

use structopt::StructOpt;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use tokio::net::UdpSocket;

use lossylink::observer::LogSink;
use lossylink::server::{Dispatcher, RandomDrop};

/// Exit status for anything wrong before the dispatch loop starts.
const EXIT_BAD_STARTUP: i32 = 22;

#[derive(StructOpt, Debug)]
#[structopt(name = "server")]
struct Opt {
	/// Port to bind, registered range only
	#[structopt(short, long, default_value = "12345")]
	port: u16,
	/// Probability of discarding an inbound frame
	#[structopt(short = "d", long, default_value = "0.2")]
	drop_probability: f64,
	/// Seconds a silent peer keeps its connection entry
	#[structopt(long, default_value = "300")]
	idle_ttl: u64,
	/// Write the log here instead of stderr
	#[structopt(long)]
	log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let opt = Opt::from_args();

	let mut builder = env_logger::Builder::from_default_env();
	if std::env::var_os("RUST_LOG").is_none() {
		builder.filter_level(log::LevelFilter::Info);
	}
	if let Some(path) = &opt.log_file {
		let file = match std::fs::File::create(path) {
			Ok(f) => f,
			Err(e) => {
				eprintln!("Error: cannot open log file {}: {}", path.display(), e);
				std::process::exit(EXIT_BAD_STARTUP);
			}
		};
		builder.target(env_logger::Target::Pipe(Box::new(file)));
	}
	builder.init();

	if !(0.0..=1.0).contains(&opt.drop_probability) {
		eprintln!(
			"Error: drop probability {} not in range (0-1)",
			opt.drop_probability
		);
		std::process::exit(EXIT_BAD_STARTUP);
	}
	if opt.port < 1024 {
		eprintln!("Error: port {} not in range (1024-65535)", opt.port);
		std::process::exit(EXIT_BAD_STARTUP);
	}
	let socket = match UdpSocket::bind(net::SocketAddr::new(
		"127.0.0.1".parse::<net::IpAddr>().unwrap(),
		opt.port,
	))
	.await
	{
		Ok(s) => s,
		Err(e) => {
			eprintln!("Error: port {} cannot be bound: {}", opt.port, e);
			std::process::exit(EXIT_BAD_STARTUP);
		}
	};
	info!("server started at {}", socket.local_addr()?);

	let filter = RandomDrop::new(opt.drop_probability, SmallRng::from_entropy());
	let mut dispatcher = Dispatcher::new(
		socket,
		filter,
		LogSink,
		Duration::from_secs(opt.idle_ttl),
	);
	dispatcher.run().await?;
	Ok(())
}
