//! Frame assembler for Modbus TCP byte streams
//!
//! TCP preserves byte order but not message boundaries: one read may hold a
//! partial frame or several frames back to back. The MBAP length field tells
//! where each frame ends.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::error::ModbusError;
use crate::pdu::Request;

/// Take one complete frame off the front of `buffer`.
///
/// Returns `None` and leaves `buffer` untouched until the header and the
/// `length` bytes it announces have all arrived. On success the frame is
/// split off and any following bytes stay in `buffer` for the next call.
pub fn try_extract_frame(buffer: &mut BytesMut) -> Option<BytesMut> {
    if buffer.len() < MBAP_HEADER_LEN {
        return None;
    }

    let length = u16::from_be_bytes([buffer[4], buffer[5]]) as usize;
    if length > MAX_MBAP_LENGTH {
        warn!(
            "MBAP length {} exceeds protocol maximum {}",
            length, MAX_MBAP_LENGTH
        );
    }
    let total = MBAP_HEADER_LEN + length;
    if buffer.len() < total {
        trace!("Partial frame: have {} of {} bytes", buffer.len(), total);
        return None;
    }

    Some(buffer.split_to(total))
}

/// `tokio_util` codec over [`try_extract_frame`].
///
/// Decodes raw frames (header included) so the caller parses them as
/// requests or responses; encodes [`Request`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct MbapCodec;

impl Decoder for MbapCodec {
    type Item = BytesMut;
    type Error = ModbusError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(try_extract_frame(src))
    }
}

impl Encoder<Request> for MbapCodec {
    type Error = ModbusError;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&request.to_bytes());
        Ok(())
    }
}

/// Servers write pre-built response frames
impl Encoder<bytes::Bytes> for MbapCodec {
    type Error = ModbusError;

    fn encode(&mut self, frame: bytes::Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(frame.chunk());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::pdu::{build_read_request, build_write_request, RegisterBank};
    use tracing_test::traced_test;

    #[test]
    fn test_short_buffer_yields_nothing() {
        let mut buffer = BytesMut::from(&[0x00, 0x01, 0x00, 0x00, 0x00][..]);
        assert!(try_extract_frame(&mut buffer).is_none());
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    #[traced_test]
    fn test_oversized_length_is_logged_and_still_waits_for_data() {
        // length 0x0200 = 512, above the 254-byte maximum
        let mut buffer = BytesMut::from(&[0x00, 0x01, 0x00, 0x00, 0x02, 0x00, 0x0A, 0x03][..]);
        assert!(try_extract_frame(&mut buffer).is_none());
        assert_eq!(buffer.len(), 8);
        assert!(logs_contain("exceeds protocol maximum"));
    }

    #[test]
    fn test_single_complete_frame() {
        let frame = build_read_request(1, 1, RegisterBank::Holding, 0, 1);
        let mut buffer = BytesMut::from(frame.as_ref());

        let extracted = try_extract_frame(&mut buffer).unwrap();
        assert_eq!(extracted.as_ref(), frame.as_ref());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_two_concatenated_frames() {
        let first = build_write_request(1, 1, 0, 1230);
        let second = build_read_request(2, 1, RegisterBank::Holding, 0, 1);

        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&first);
        buffer.extend_from_slice(&second);

        assert_eq!(try_extract_frame(&mut buffer).unwrap().as_ref(), first.as_ref());
        assert_eq!(try_extract_frame(&mut buffer).unwrap().as_ref(), second.as_ref());
        assert!(try_extract_frame(&mut buffer).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let frame = build_read_request(3, 1, RegisterBank::Input, 0, 2);
        let (head, tail) = frame.split_at(7);

        let mut buffer = BytesMut::from(head);
        assert!(try_extract_frame(&mut buffer).is_none());
        assert_eq!(buffer.as_ref(), head);

        buffer.extend_from_slice(tail);
        assert_eq!(try_extract_frame(&mut buffer).unwrap().as_ref(), frame.as_ref());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_trailing_partial_frame_is_kept() {
        let first = build_read_request(1, 1, RegisterBank::Holding, 0, 1);
        let second = build_read_request(2, 1, RegisterBank::Holding, 1, 1);

        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&first);
        buffer.extend_from_slice(&second[..4]);

        assert_eq!(try_extract_frame(&mut buffer).unwrap().as_ref(), first.as_ref());
        assert!(try_extract_frame(&mut buffer).is_none());
        assert_eq!(buffer.as_ref(), &second[..4]);
    }

    #[test]
    fn test_codec_decode_and_encode() {
        let mut codec = MbapCodec;
        let request = crate::pdu::Request {
            transaction_id: 9,
            unit_id: 2,
            pdu: crate::pdu::RequestPdu::WriteSingleRegister {
                address: 1,
                value: 2,
            },
        };

        let mut wire = BytesMut::new();
        codec.encode(request, &mut wire).unwrap();
        assert_eq!(wire.as_ref(), build_write_request(9, 2, 1, 2).as_ref());

        let decoded = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded.len(), 12);
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }
}
