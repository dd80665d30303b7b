use std::collections::{HashMap, VecDeque};
use std::io::Error as StdIoError;
use std::net::SocketAddr;
use std::time::Duration;

use log::debug;

use rand::Rng;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::frame::{Request, RECV_BUFFER_LEN};
use crate::observer::EventSink;

use super::connection::{Connection, ConnectionState};

/// Upper bound on one blocking receive; also the period of the idle sweep.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Decides the fate of each decoded inbound frame before any connection
/// state is touched. Injectable so tests can script the link instead of
/// rolling ambient dice.
pub trait DropFilter {
	fn should_drop(&mut self) -> bool;
}

/// Simulated transport loss: discard with fixed probability.
pub struct RandomDrop<R> {
	probability: f64,
	rng: R,
}

impl<R: Rng> RandomDrop<R> {
	pub fn new(probability: f64, rng: R) -> RandomDrop<R> {
		debug_assert!((0.0..=1.0).contains(&probability));
		RandomDrop { probability, rng }
	}
}

impl<R: Rng> DropFilter for RandomDrop<R> {
	fn should_drop(&mut self) -> bool {
		self.rng.gen::<f64>() < self.probability
	}
}

/// Explicit decision sequence. Passes everything once the script is spent.
pub struct ScriptedDrop {
	decisions: VecDeque<bool>,
}

impl ScriptedDrop {
	pub fn new<T: Into<VecDeque<bool>>>(decisions: T) -> ScriptedDrop {
		ScriptedDrop {
			decisions: decisions.into(),
		}
	}
}

impl DropFilter for ScriptedDrop {
	fn should_drop(&mut self) -> bool {
		self.decisions.pop_front().unwrap_or(false)
	}
}

/// Single receive loop owning the socket and the per-peer connection
/// table. Only this loop ever touches the table, so no locking is needed.
pub struct Dispatcher<F: DropFilter, S: EventSink> {
	socket: UdpSocket,
	filter: F,
	sink: S,
	idle_ttl: Duration,
	connections: HashMap<SocketAddr, Connection>,
}

impl<F: DropFilter, S: EventSink> Dispatcher<F, S> {
	pub fn new(socket: UdpSocket, filter: F, sink: S, idle_ttl: Duration) -> Dispatcher<F, S> {
		Dispatcher {
			socket,
			filter,
			sink,
			idle_ttl,
			connections: HashMap::new(),
		}
	}

	pub fn connection_count(&self) -> usize {
		self.connections.len()
	}

	pub fn has_connection(&self, addr: &SocketAddr) -> bool {
		self.connections.contains_key(addr)
	}

	pub async fn run(&mut self) -> Result<(), StdIoError> {
		let mut backing = [0u8; RECV_BUFFER_LEN];
		loop {
			self.evict_idle();
			let (sz, addr) = match timeout(RECV_TIMEOUT, self.socket.recv_from(&mut backing[..]))
				.await
			{
				// nothing arrived, go around again
				Err(_) => continue,
				Ok(result) => result?,
			};
			// there is no framing recovery; a malformed datagram ends the loop
			let frame = Request::read(&mut &backing[..sz])?;
			self.dispatch(addr, frame).await?;
		}
	}

	async fn dispatch(&mut self, addr: SocketAddr, frame: Request) -> Result<(), StdIoError> {
		self.sink.frame_received(addr, frame.type_, frame.seq_no);
		if self.filter.should_drop() {
			// simulated loss: no reply, no state change, no table entry
			self.sink.frame_dropped(addr, frame.type_, frame.seq_no);
			return Ok(());
		}
		let conn = self
			.connections
			.entry(addr)
			.or_insert_with(|| Connection::new(addr));
		let state = conn
			.handle_message(&self.socket, &frame, &mut self.sink)
			.await?;
		if state == ConnectionState::Disconnected {
			self.connections.remove(&addr);
			debug!("removed connection for {}", addr);
		}
		Ok(())
	}

	/// Evict table entries idle past the TTL, FIN or not. Keeps a peer
	/// that vanished mid-session from leaking its entry forever.
	fn evict_idle(&mut self) {
		let idle_ttl = self.idle_ttl;
		let expired: Vec<SocketAddr> = self
			.connections
			.iter()
			.filter(|(_, conn)| conn.idle_for() > idle_ttl)
			.map(|(addr, _)| *addr)
			.collect();
		for addr in expired {
			self.connections.remove(&addr);
			self.sink.state_changed(addr, "evicted");
		}
	}
}
