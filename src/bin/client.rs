use std::net;

use structopt::StructOpt;

use tokio::net::UdpSocket;

use lossylink::client::{stats, Session, SessionState};
use lossylink::observer::LogSink;

#[derive(StructOpt, Debug)]
#[structopt(name = "client")]
struct Opt {
	/// Server address
	#[structopt(long, default_value = "127.0.0.1")]
	host: String,
	/// Server port
	#[structopt(short, long, default_value = "12345")]
	port: u16,
	/// Number of data exchanges to run
	#[structopt(short = "n", long, default_value = "10")]
	count: u32,
	/// Retry bound per data exchange
	#[structopt(long, default_value = "2")]
	data_retries: u32,
	/// Retry bound for the connect and disconnect handshakes
	#[structopt(long, default_value = "5")]
	connect_retries: u32,
	/// Trace every frame
	#[structopt(short, long)]
	verbose: bool,
}

fn print_summary(summary: &stats::Summary) {
	match summary {
		stats::Summary::NoPacketsSent => println!("No packets sent."),
		stats::Summary::LossOnly { loss_rate } => println!(
			"Loss Rate: {:.2}%, No RTT data available.",
			loss_rate * 100.0
		),
		stats::Summary::Full {
			loss_rate,
			max_rtt,
			min_rtt,
			mean_rtt,
			std_rtt,
			peer_time_span,
		} => println!(
			"Loss Rate: {:.2}%, Max RTT: {:.5} us, Min RTT: {:.5} us, Average RTT: {:.5} us, RTT Standard Deviation: {:.5} us, Server Time Span: {:.5} us",
			loss_rate * 100.0,
			max_rtt,
			min_rtt,
			mean_rtt,
			std_rtt,
			peer_time_span
		),
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let opt = Opt::from_args();

	let mut builder = env_logger::Builder::from_default_env();
	if std::env::var_os("RUST_LOG").is_none() {
		builder.filter_level(log::LevelFilter::Info);
	}
	if opt.verbose {
		builder.filter_level(log::LevelFilter::Debug);
	}
	builder.init();

	let peer = net::SocketAddr::new(opt.host.parse::<net::IpAddr>()?, opt.port);
	let socket = UdpSocket::bind(net::SocketAddr::new(
		"0.0.0.0".parse::<net::IpAddr>().unwrap(),
		0u16,
	))
	.await?;

	let mut session = Session::new(
		socket,
		peer,
		opt.connect_retries,
		opt.data_retries,
		LogSink,
	);
	let outcome = session
		.run(opt.count, &b"Hello, TCP over UDP!"[..])
		.await;
	// a connect failure aborts before the data phase; only a session that
	// got past it has anything to report
	if session.state() == SessionState::Closed {
		print_summary(&stats::summarize(&session.report()));
	}
	outcome?;
	Ok(())
}
