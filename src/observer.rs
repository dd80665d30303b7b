use std::net::SocketAddr;

use log::{debug, info};

use crate::frame::FrameType;

/// Side channel for protocol events. The state machines report through this
/// instead of printing; the binaries install [`LogSink`], tests install
/// recording sinks.
pub trait EventSink {
	fn frame_sent(&mut self, _peer: SocketAddr, _type_: FrameType, _seq_no: i16) {}
	fn frame_received(&mut self, _peer: SocketAddr, _type_: FrameType, _seq_no: i16) {}
	fn frame_dropped(&mut self, _peer: SocketAddr, _type_: FrameType, _seq_no: i16) {}
	fn state_changed(&mut self, _peer: SocketAddr, _state: &'static str) {}
}

/// Sink that forwards everything to the `log` macros.
pub struct LogSink;

impl EventSink for LogSink {
	fn frame_sent(&mut self, peer: SocketAddr, type_: FrameType, seq_no: i16) {
		debug!("sent: seq.no {} type {:?} to {}", seq_no, type_, peer);
	}

	fn frame_received(&mut self, peer: SocketAddr, type_: FrameType, seq_no: i16) {
		debug!("received: seq.no {} type {:?} from {}", seq_no, type_, peer);
	}

	fn frame_dropped(&mut self, peer: SocketAddr, type_: FrameType, seq_no: i16) {
		info!("drop! seq.no {} type {:?} from {}", seq_no, type_, peer);
	}

	fn state_changed(&mut self, peer: SocketAddr, state: &'static str) {
		info!("{} is now {}", peer, state);
	}
}

/// Sink that swallows everything.
pub struct NullSink;

impl EventSink for NullSink {}
