use std::io::Error as StdIoError;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;

use tokio::net::UdpSocket;

use chrono::Utc;

use crate::frame::{FrameType, Reply, Request};
use crate::observer::EventSink;

/// Server send time as seconds since the epoch, the value every reply
/// frame carries.
fn unix_time() -> f64 {
	let now = Utc::now();
	now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Unconnected,
	Connected,
	Disconnected,
}

impl ConnectionState {
	fn label(self) -> &'static str {
		match self {
			ConnectionState::Unconnected => "unconnected",
			ConnectionState::Connected => "connected",
			ConnectionState::Disconnected => "disconnected",
		}
	}
}

/// Per-peer connection state. Does not own the socket — the shared server
/// socket is borrowed per call and outlives every connection.
pub struct Connection {
	peer: SocketAddr,
	state: ConnectionState,
	last_activity: Instant,
}

impl Connection {
	pub fn new(peer: SocketAddr) -> Connection {
		Connection {
			peer,
			state: ConnectionState::Unconnected,
			last_activity: Instant::now(),
		}
	}

	pub fn state(&self) -> ConnectionState {
		self.state
	}

	/// Time since the last frame dispatched to this connection, for the
	/// idle sweep.
	pub fn idle_for(&self) -> Duration {
		self.last_activity.elapsed()
	}

	fn set_state<S: EventSink>(&mut self, next: ConnectionState, sink: &mut S) {
		self.state = next;
		sink.state_changed(self.peer, next.label());
	}

	async fn send_reply<S: EventSink>(
		&self,
		via: &UdpSocket,
		seq_no: i16,
		type_: FrameType,
		sink: &mut S,
	) -> Result<(), StdIoError> {
		let frame = Reply {
			seq_no,
			type_,
			timestamp: unix_time(),
			payload: Bytes::new(),
		};
		via.send_to(&frame.encode()?[..], self.peer).await?;
		sink.frame_sent(self.peer, type_, seq_no);
		Ok(())
	}

	/// Drive the state machine with one inbound frame and return the state
	/// it ends up in.
	///
	/// Deliberately guard-free: NORMAL_DATA is echoed in any state, and a
	/// SYN on an already-connected peer still gets its SYN_ACK without
	/// resetting anything.
	pub async fn handle_message<S: EventSink>(
		&mut self,
		via: &UdpSocket,
		frame: &Request,
		sink: &mut S,
	) -> Result<ConnectionState, StdIoError> {
		self.last_activity = Instant::now();
		match frame.type_ {
			FrameType::Syn => {
				self.send_reply(via, 0, FrameType::SynAck, sink).await?;
				self.set_state(ConnectionState::Connected, sink);
			}
			FrameType::Fin => {
				self.send_reply(via, 0, FrameType::FinAck, sink).await?;
				self.set_state(ConnectionState::Disconnected, sink);
			}
			FrameType::NormalData => {
				self.send_reply(via, frame.seq_no, FrameType::NormalData, sink)
					.await?;
			}
			// everything else gets no reply and changes nothing
			_ => (),
		}
		Ok(self.state)
	}
}
