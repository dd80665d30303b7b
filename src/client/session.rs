use std::io::{Error as StdIoError, ErrorKind as StdIoErrorKind};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, warn};

use bytes::Bytes;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::frame::{FrameType, Reply, Request, RECV_BUFFER_LEN};
use crate::observer::EventSink;

/// Fixed per-attempt wait for a reply. The only deadline in the protocol
/// besides the bounded retry counts.
const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Idle,
	Connecting,
	Connected,
	Disconnecting,
	Closed,
}

impl SessionState {
	fn label(self) -> &'static str {
		match self {
			SessionState::Idle => "idle",
			SessionState::Connecting => "connecting",
			SessionState::Connected => "connected",
			SessionState::Disconnecting => "disconnecting",
			SessionState::Closed => "closed",
		}
	}
}

/// Counters and samples a session hands to the statistics collector once
/// it is over.
#[derive(Debug, Clone)]
pub struct SessionReport {
	pub sent_count: u64,
	pub received_count: u64,
	pub rtt_samples: Vec<Duration>,
	pub first_peer_timestamp: Option<f64>,
	pub last_peer_timestamp: Option<f64>,
}

/// Outcome of one retried transfer: the reply (if any arrived within the
/// retry bound), its round-trip time, and the number of attempts spent.
#[derive(Debug)]
pub(crate) struct Exchange {
	pub reply: Option<Reply>,
	pub rtt: Option<Duration>,
	pub attempts: u32,
}

/// One client session against a single peer.
///
/// Drives connect → data exchanges → disconnect over an already-bound UDP
/// socket. Strictly one outstanding request: every exchange completes
/// (reply or retry exhaustion) before the next begins.
pub struct Session<S: EventSink> {
	socket: UdpSocket,
	peer: SocketAddr,
	state: SessionState,
	seq_no: i16,
	sent_count: u64,
	received_count: u64,
	rtt_samples: Vec<Duration>,
	first_peer_timestamp: Option<f64>,
	last_peer_timestamp: Option<f64>,
	connect_retries: u32,
	data_retries: u32,
	sink: S,
}

impl<S: EventSink> Session<S> {
	pub fn new(
		socket: UdpSocket,
		peer: SocketAddr,
		connect_retries: u32,
		data_retries: u32,
		sink: S,
	) -> Session<S> {
		Session {
			socket,
			peer,
			state: SessionState::Idle,
			seq_no: 0,
			sent_count: 0,
			received_count: 0,
			rtt_samples: Vec::new(),
			first_peer_timestamp: None,
			last_peer_timestamp: None,
			connect_retries,
			data_retries,
			sink,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn seq_no(&self) -> i16 {
		self.seq_no
	}

	pub fn sent_count(&self) -> u64 {
		self.sent_count
	}

	pub fn received_count(&self) -> u64 {
		self.received_count
	}

	pub fn report(&self) -> SessionReport {
		SessionReport {
			sent_count: self.sent_count,
			received_count: self.received_count,
			rtt_samples: self.rtt_samples.clone(),
			first_peer_timestamp: self.first_peer_timestamp,
			last_peer_timestamp: self.last_peer_timestamp,
		}
	}

	fn set_state(&mut self, next: SessionState) {
		self.state = next;
		self.sink.state_changed(self.peer, next.label());
	}

	async fn send(&mut self, type_: FrameType, payload: Bytes) -> Result<(), StdIoError> {
		let frame = Request {
			seq_no: self.seq_no,
			type_,
			payload,
		};
		let encoded = frame.encode()?;
		self.socket.send_to(&encoded[..], self.peer).await?;
		self.sent_count += 1;
		self.sink.frame_sent(self.peer, type_, frame.seq_no);
		Ok(())
	}

	async fn recv(&mut self) -> Result<Reply, StdIoError> {
		let mut backing = [0u8; RECV_BUFFER_LEN];
		// the reply source is deliberately unchecked
		let (sz, _) = self.socket.recv_from(&mut backing[..]).await?;
		Reply::read(&mut &backing[..sz])
	}

	/// Shared retry primitive: send, wait one [`ATTEMPT_TIMEOUT`], repeat
	/// up to `retries + 1` times.
	///
	/// The first datagram to arrive ends the attempt, whatever its type;
	/// type-correctness is the caller's job. A stricter wait-for-matching
	/// loop would change the observable attempt counts.
	pub(crate) async fn transfer(
		&mut self,
		type_: FrameType,
		payload: Bytes,
		retries: u32,
	) -> Result<Exchange, StdIoError> {
		let mut attempt = 1u32;
		while attempt <= retries + 1 {
			let start = Instant::now();
			self.send(type_, payload.clone()).await?;
			let reply = match timeout(ATTEMPT_TIMEOUT, self.recv()).await {
				// no reply within the per-attempt window, try again
				Err(_) => {
					attempt += 1;
					continue;
				}
				Ok(result) => result?,
			};
			let rtt = start.elapsed();
			self.received_count += 1;
			self.rtt_samples.push(rtt);
			if self.first_peer_timestamp.is_none() {
				self.first_peer_timestamp = Some(reply.timestamp);
			}
			self.last_peer_timestamp = Some(reply.timestamp);
			self.sink.frame_received(self.peer, reply.type_, reply.seq_no);
			return Ok(Exchange {
				reply: Some(reply),
				rtt: Some(rtt),
				attempts: attempt,
			});
		}
		Ok(Exchange {
			reply: None,
			rtt: None,
			attempts: attempt - 1,
		})
	}

	/// SYN/SYN_ACK handshake. Any failure aborts the whole session; no
	/// data phase is attempted afterwards.
	pub async fn connect(&mut self) -> Result<(), StdIoError> {
		self.set_state(SessionState::Connecting);
		let exchange = self
			.transfer(FrameType::Syn, Bytes::new(), self.connect_retries)
			.await?;
		match exchange.reply {
			Some(Reply {
				type_: FrameType::SynAck,
				..
			}) => {
				self.set_state(SessionState::Connected);
				self.seq_no = 1;
				Ok(())
			}
			Some(reply) => Err(StdIoError::new(
				StdIoErrorKind::InvalidData,
				format!(
					"server answered incorrectly: expected SYN_ACK, received {:?}",
					reply.type_
				),
			)),
			None => Err(StdIoError::new(
				StdIoErrorKind::TimedOut,
				"server did not answer",
			)),
		}
	}

	/// One data exchange. Returns whether the exchange was delivered;
	/// retry exhaustion counts as a loss and the session continues. An
	/// echoed sequence number that does not match the current one is a
	/// protocol violation nothing can resynchronize — it aborts the
	/// session.
	pub async fn send_data<T: Into<Bytes>>(&mut self, payload: T) -> Result<bool, StdIoError> {
		let exchange = self
			.transfer(FrameType::NormalData, payload.into(), self.data_retries)
			.await?;
		let delivered = match exchange.reply {
			Some(reply) => {
				if reply.seq_no != self.seq_no {
					return Err(StdIoError::new(
						StdIoErrorKind::InvalidData,
						format!(
							"protocol violation: sent seq.no {}, reply echoed {}",
							self.seq_no, reply.seq_no
						),
					));
				}
				debug!(
					"seq.no {} delivered on attempt {} (rtt {:?})",
					self.seq_no, exchange.attempts, exchange.rtt
				);
				true
			}
			None => {
				warn!(
					"seq.no {} lost after {} attempts",
					self.seq_no, exchange.attempts
				);
				false
			}
		};
		self.seq_no = self.seq_no.wrapping_add(1);
		Ok(delivered)
	}

	/// FIN/FIN_ACK handshake. Teardown always succeeds locally: a missing
	/// or wrong-typed confirmation still ends in [`SessionState::Closed`],
	/// just not gracefully.
	pub async fn disconnect(&mut self) -> Result<bool, StdIoError> {
		self.set_state(SessionState::Disconnecting);
		let exchange = self
			.transfer(FrameType::Fin, Bytes::new(), self.connect_retries)
			.await?;
		let graceful = match exchange.reply {
			Some(Reply {
				type_: FrameType::FinAck,
				..
			}) => true,
			_ => {
				warn!("no FIN_ACK from {}, disconnecting unilaterally", self.peer);
				false
			}
		};
		self.seq_no = 0;
		self.set_state(SessionState::Closed);
		Ok(graceful)
	}

	/// Top-level driver: connect, `exchanges` sequential data exchanges,
	/// disconnect. The teardown runs even when the data phase died on a
	/// protocol violation; a connect failure aborts before anything else.
	pub async fn run<T: Into<Bytes>>(
		&mut self,
		exchanges: u32,
		payload: T,
	) -> Result<(), StdIoError> {
		self.connect().await?;
		let payload = payload.into();
		let mut fatal = None;
		for _ in 0..exchanges {
			match self.send_data(payload.clone()).await {
				Ok(_) => (),
				Err(e) => {
					fatal = Some(e);
					break;
				}
			}
		}
		let teardown = self.disconnect().await;
		if let Some(e) = fatal {
			return Err(e);
		}
		teardown?;
		Ok(())
	}
}
