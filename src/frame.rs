use std::convert::TryInto;
use std::io::{Error as StdIoError, ErrorKind as StdIoErrorKind};

use num_enum::TryFromPrimitive;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub static PROTOCOL_VERSION: u8 = 2;

/// Total on-wire size of a frame. Identical in both directions: the
/// timestamp on server-originated frames eats 8 bytes of payload capacity
/// instead of growing the datagram.
pub const FRAME_LEN: usize = 203;
/// Payload capacity of a client-originated frame.
pub const REQUEST_PAYLOAD_LEN: usize = 199;
/// Payload capacity of a server-originated frame.
pub const REPLY_PAYLOAD_LEN: usize = 191;
/// Receive buffer size. Larger than [`FRAME_LEN`] so that overlong
/// datagrams reach the decoder (and fail there) instead of being silently
/// truncated by the kernel.
pub const RECV_BUFFER_LEN: usize = 300;

#[repr(u8)]
#[derive(TryFromPrimitive, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameType {
	Syn = 0,
	SynAck = 1,
	Ack = 2,
	Fin = 3,
	FinAck = 4,
	NormalData = 5,
}

fn read_prefix<R: Buf>(r: &mut R) -> Result<(i16, FrameType), StdIoError> {
	let seq_no = r.get_i16();
	let version = r.get_u8();
	if version != PROTOCOL_VERSION {
		return Err(StdIoError::new(
			StdIoErrorKind::InvalidData,
			"unsupported version",
		));
	}
	let type_: FrameType = match r.get_u8().try_into() {
		Ok(v) => v,
		Err(e) => return Err(StdIoError::new(StdIoErrorKind::InvalidData, e)),
	};
	Ok((seq_no, type_))
}

// A payload genuinely ending in zero bytes is indistinguishable from
// padding; accepted ambiguity of the fixed-format layout.
fn trim_padding(mut payload: Bytes) -> Bytes {
	let end = payload
		.iter()
		.rposition(|&b| b != 0)
		.map(|i| i + 1)
		.unwrap_or(0);
	payload.truncate(end);
	payload
}

/// Client-originated frame. Carries no timestamp field; the asymmetry is
/// part of the wire contract, not an oversight.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
	pub seq_no: i16,
	pub type_: FrameType,
	pub payload: Bytes,
}

impl Request {
	pub fn read<R: Buf>(r: &mut R) -> Result<Request, StdIoError> {
		if r.remaining() != FRAME_LEN {
			return Err(StdIoError::new(
				StdIoErrorKind::InvalidData,
				"datagram length does not match the fixed frame size",
			));
		}
		let (seq_no, type_) = read_prefix(r)?;
		let payload = trim_padding(r.copy_to_bytes(REQUEST_PAYLOAD_LEN));
		Ok(Request {
			seq_no,
			type_,
			payload,
		})
	}

	pub fn write<W: BufMut>(&self, w: &mut W) -> Result<(), StdIoError> {
		if self.payload.len() > REQUEST_PAYLOAD_LEN {
			return Err(StdIoError::new(
				StdIoErrorKind::InvalidInput,
				"payload too large",
			));
		}
		if w.remaining_mut() < FRAME_LEN {
			return Err(StdIoError::new(
				StdIoErrorKind::UnexpectedEof,
				"not enough bytes left for a request frame",
			));
		}
		w.put_i16(self.seq_no);
		w.put_u8(PROTOCOL_VERSION);
		w.put_u8(self.type_ as u8);
		w.put(&self.payload[..]);
		w.put_bytes(0u8, REQUEST_PAYLOAD_LEN - self.payload.len());
		Ok(())
	}

	pub fn encode(&self) -> Result<Bytes, StdIoError> {
		let mut buf = BytesMut::with_capacity(FRAME_LEN);
		self.write(&mut buf)?;
		Ok(buf.freeze())
	}
}

/// Server-originated frame. Always carries the server send time as seconds
/// since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
	pub seq_no: i16,
	pub type_: FrameType,
	pub timestamp: f64,
	pub payload: Bytes,
}

impl Reply {
	pub fn read<R: Buf>(r: &mut R) -> Result<Reply, StdIoError> {
		if r.remaining() != FRAME_LEN {
			return Err(StdIoError::new(
				StdIoErrorKind::InvalidData,
				"datagram length does not match the fixed frame size",
			));
		}
		let (seq_no, type_) = read_prefix(r)?;
		let timestamp = r.get_f64();
		let payload = trim_padding(r.copy_to_bytes(REPLY_PAYLOAD_LEN));
		Ok(Reply {
			seq_no,
			type_,
			timestamp,
			payload,
		})
	}

	pub fn write<W: BufMut>(&self, w: &mut W) -> Result<(), StdIoError> {
		if self.payload.len() > REPLY_PAYLOAD_LEN {
			return Err(StdIoError::new(
				StdIoErrorKind::InvalidInput,
				"payload too large",
			));
		}
		if w.remaining_mut() < FRAME_LEN {
			return Err(StdIoError::new(
				StdIoErrorKind::UnexpectedEof,
				"not enough bytes left for a reply frame",
			));
		}
		w.put_i16(self.seq_no);
		w.put_u8(PROTOCOL_VERSION);
		w.put_u8(self.type_ as u8);
		w.put_f64(self.timestamp);
		w.put(&self.payload[..]);
		w.put_bytes(0u8, REPLY_PAYLOAD_LEN - self.payload.len());
		Ok(())
	}

	pub fn encode(&self) -> Result<Bytes, StdIoError> {
		let mut buf = BytesMut::with_capacity(FRAME_LEN);
		self.write(&mut buf)?;
		Ok(buf.freeze())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(seq_no: i16, type_: FrameType, payload: &[u8]) -> Request {
		Request {
			seq_no,
			type_,
			payload: Bytes::copy_from_slice(payload),
		}
	}

	fn reply(seq_no: i16, type_: FrameType, timestamp: f64, payload: &[u8]) -> Reply {
		Reply {
			seq_no,
			type_,
			timestamp,
			payload: Bytes::copy_from_slice(payload),
		}
	}

	#[test]
	fn test_request_roundtrip() {
		let frame = request(2342, FrameType::NormalData, b"Hello, TCP over UDP!");
		let encoded = frame.encode().unwrap();
		assert_eq!(encoded.len(), FRAME_LEN);
		let decoded = Request::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, frame);
	}

	#[test]
	fn test_reply_roundtrip() {
		let frame = reply(17, FrameType::SynAck, 1700000000.125, b"");
		let encoded = frame.encode().unwrap();
		assert_eq!(encoded.len(), FRAME_LEN);
		let decoded = Reply::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, frame);
	}

	#[test]
	fn test_both_directions_have_equal_frame_size() {
		let q = request(0, FrameType::Syn, b"").encode().unwrap();
		let p = reply(0, FrameType::SynAck, 0.0, b"").encode().unwrap();
		assert_eq!(q.len(), p.len());
	}

	#[test]
	fn test_prefix_is_big_endian_on_wire() {
		let encoded = request(0x0102, FrameType::Fin, b"").encode().unwrap();
		assert_eq!(&encoded[..4], &[0x01, 0x02, PROTOCOL_VERSION, 3]);
	}

	#[test]
	fn test_negative_seq_no_roundtrip() {
		let encoded = request(-5, FrameType::NormalData, b"x").encode().unwrap();
		let decoded = Request::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded.seq_no, -5);
	}

	#[test]
	fn test_trailing_zeros_in_payload_are_trimmed_as_padding() {
		// trailing zero bytes cannot be told apart from padding
		let frame = request(1, FrameType::NormalData, b"abc\0\0");
		let encoded = frame.encode().unwrap();
		let decoded = Request::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded.payload, &b"abc"[..]);
	}

	#[test]
	fn test_interior_zeros_survive() {
		let frame = reply(1, FrameType::NormalData, 0.0, b"a\0b");
		let encoded = frame.encode().unwrap();
		let decoded = Reply::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded.payload, &b"a\0b"[..]);
	}

	#[test]
	fn test_all_zero_payload_decodes_empty() {
		let frame = request(1, FrameType::NormalData, b"\0\0\0");
		let encoded = frame.encode().unwrap();
		let decoded = Request::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded.payload, &b""[..]);
	}

	#[test]
	fn test_request_accepts_payload_at_capacity() {
		let payload = [0x42u8; REQUEST_PAYLOAD_LEN];
		let frame = request(1, FrameType::NormalData, &payload[..]);
		let decoded = Request::read(&mut &frame.encode().unwrap()[..]).unwrap();
		assert_eq!(decoded.payload.len(), REQUEST_PAYLOAD_LEN);
	}

	#[test]
	fn test_request_rejects_oversized_payload() {
		let payload = [0x42u8; REQUEST_PAYLOAD_LEN + 1];
		match request(1, FrameType::NormalData, &payload[..]).encode() {
			Err(e) => assert_eq!(e.kind(), StdIoErrorKind::InvalidInput),
			other => panic!("unexpected encode result: {:?}", other),
		}
	}

	#[test]
	fn test_reply_rejects_oversized_payload() {
		// the timestamp costs replies 8 bytes of capacity
		let payload = [0x42u8; REPLY_PAYLOAD_LEN + 1];
		match reply(1, FrameType::NormalData, 0.0, &payload[..]).encode() {
			Err(e) => assert_eq!(e.kind(), StdIoErrorKind::InvalidInput),
			other => panic!("unexpected encode result: {:?}", other),
		}
	}

	#[test]
	fn test_read_rejects_short_datagram() {
		let encoded = request(1, FrameType::Syn, b"").encode().unwrap();
		match Request::read(&mut &encoded[..FRAME_LEN - 1]) {
			Err(e) => assert_eq!(e.kind(), StdIoErrorKind::InvalidData),
			other => panic!("unexpected read result: {:?}", other),
		}
	}

	#[test]
	fn test_read_rejects_overlong_datagram() {
		let mut encoded = request(1, FrameType::Syn, b"").encode().unwrap().to_vec();
		encoded.push(0);
		match Request::read(&mut &encoded[..]) {
			Err(e) => assert_eq!(e.kind(), StdIoErrorKind::InvalidData),
			other => panic!("unexpected read result: {:?}", other),
		}
	}

	#[test]
	fn test_read_rejects_unknown_version() {
		let mut encoded = request(1, FrameType::Syn, b"").encode().unwrap().to_vec();
		encoded[2] = PROTOCOL_VERSION + 1;
		match Request::read(&mut &encoded[..]) {
			Err(e) => assert_eq!(e.kind(), StdIoErrorKind::InvalidData),
			other => panic!("unexpected read result: {:?}", other),
		}
	}

	#[test]
	fn test_read_rejects_unknown_type() {
		let mut encoded = reply(1, FrameType::Syn, 0.0, b"").encode().unwrap().to_vec();
		encoded[3] = 0x7f;
		match Reply::read(&mut &encoded[..]) {
			Err(e) => assert_eq!(e.kind(), StdIoErrorKind::InvalidData),
			other => panic!("unexpected read result: {:?}", other),
		}
	}

	#[test]
	fn test_timestamp_roundtrip_is_exact() {
		let ts = 1234567890.987654;
		let encoded = reply(0, FrameType::NormalData, ts, b"").encode().unwrap();
		let decoded = Reply::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded.timestamp, ts);
	}
}
