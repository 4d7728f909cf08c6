//! Decoder for the `application/vnd.amazon.eventstream` framing used by
//! `invoke-with-response-stream`.
//!
//! Frame layout (all integers big-endian):
//! `total_len: u32 | headers_len: u32 | prelude_crc: u32 | headers | payload | message_crc: u32`
//!
//! Both checksums are CRC-32 (IEEE): the prelude CRC covers the first 8 bytes,
//! the message CRC covers everything before it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;

use super::stream::StreamEvent;
use crate::error::{Error, Result};

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + CRC_LEN;
/// Frames larger than this are treated as corruption.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One decoded frame. Only string-typed headers are kept; every header this
/// client routes on (`:message-type`, `:event-type`, ...) is a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub headers: Vec<(String, String)>,
    pub payload: Bytes,
}

impl Frame {
    /// Look up a string-typed header.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v.as_str()))
    }

    /// Classify the frame as a stream event.
    ///
    /// Exception and error frames carry upstream failures and are returned as errors.
    pub fn into_event(self) -> Result<StreamEvent> {
        match self.header_str(":message-type") {
            Some("event") => match self.header_str(":event-type") {
                Some("chunk") => decode_chunk_payload(&self.payload).map(StreamEvent::Chunk),
                Some(tag) => Ok(StreamEvent::UnknownVariant(tag.to_string())),
                None => Ok(StreamEvent::Unrecognized),
            },
            Some("exception") => {
                let kind = self.header_str(":exception-type").unwrap_or("UnknownException");
                let message = serde_json::from_slice::<ExceptionPayload>(&self.payload)
                    .map(|p| p.message)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&self.payload).into_owned());
                Err(Error::Invocation(format!("{}: {}", kind, message)))
            }
            Some("error") => {
                let code = self.header_str(":error-code").unwrap_or("UnknownError");
                let message = self.header_str(":error-message").unwrap_or("no message");
                Err(Error::Invocation(format!("{}: {}", code, message)))
            }
            _ => Ok(StreamEvent::Unrecognized),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    bytes: String,
}

#[derive(Debug, Deserialize)]
struct ExceptionPayload {
    #[serde(alias = "Message")]
    message: String,
}

fn decode_chunk_payload(payload: &[u8]) -> Result<Vec<u8>> {
    let wrapper: ChunkPayload = serde_json::from_slice(payload)
        .map_err(|e| Error::MalformedChunk(format!("invalid chunk wrapper: {}", e)))?;
    STANDARD
        .decode(wrapper.bytes.as_bytes())
        .map_err(|e| Error::MalformedChunk(format!("invalid base64 in chunk: {}", e)))
}

/// Incremental frame decoder; feed it network chunks as they arrive.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the response body.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let prelude_crc = read_u32(&self.buffer[8..12]);
        if crc32fast::hash(&self.buffer[0..8]) != prelude_crc {
            return Err(Error::Invocation(
                "event-stream prelude checksum mismatch".to_string(),
            ));
        }

        let total_len = read_u32(&self.buffer[0..4]) as usize;
        let headers_len = read_u32(&self.buffer[4..8]) as usize;
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len)
            || headers_len > total_len - MIN_FRAME_LEN
        {
            return Err(Error::Invocation(format!(
                "corrupt event-stream frame (total {} bytes, headers {} bytes)",
                total_len, headers_len
            )));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(total_len).freeze();
        let message_crc = read_u32(&frame[total_len - CRC_LEN..]);
        if crc32fast::hash(&frame[..total_len - CRC_LEN]) != message_crc {
            return Err(Error::Invocation(
                "event-stream message checksum mismatch".to_string(),
            ));
        }
        frame.advance(PRELUDE_LEN);
        let mut headers = frame.split_to(headers_len);
        let payload = frame.split_to(frame.len() - CRC_LEN);

        Ok(Some(Frame {
            headers: parse_headers(&mut headers)?,
            payload,
        }))
    }

    /// Verify no partial frame is left once the body has ended.
    pub fn finish(&self) -> Result<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(Error::Invocation(format!(
                "event stream ended inside a frame ({} bytes left over)",
                self.buffer.len()
            )))
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn truncated() -> Error {
    Error::Invocation("truncated event-stream header".to_string())
}

fn take(buf: &mut Bytes, len: usize) -> Result<Bytes> {
    if buf.remaining() < len {
        return Err(truncated());
    }
    Ok(buf.split_to(len))
}

fn take_string(buf: &mut Bytes, len: usize) -> Result<String> {
    let raw = take(buf, len)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| Error::Invocation("non UTF-8 event-stream header".to_string()))
}

/// Parse the header block, keeping string values and skipping the other types.
fn parse_headers(buf: &mut Bytes) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    while buf.has_remaining() {
        let name_len = buf.get_u8() as usize;
        let name = take_string(buf, name_len)?;
        if !buf.has_remaining() {
            return Err(truncated());
        }
        let skip = match buf.get_u8() {
            // bool true / bool false carry no value bytes
            0 | 1 => 0,
            2 => 1,
            3 => 2,
            4 => 4,
            5 | 8 => 8,
            9 => 16,
            6 => take(buf, 2)?.get_u16() as usize,
            7 => {
                let len = take(buf, 2)?.get_u16() as usize;
                headers.push((name, take_string(buf, len)?));
                continue;
            }
            other => {
                return Err(Error::Invocation(format!(
                    "unknown event-stream header type {}",
                    other
                )))
            }
        };
        take(buf, skip)?;
    }
    Ok(headers)
}

/// Encode a frame with string headers and valid checksums.
#[cfg(test)]
pub(crate) fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }
    let total = MIN_FRAME_LEN + header_bytes.len() + payload.len();

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(total as u32).to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&prelude_crc.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    let message_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&message_crc.to_be_bytes());
    frame
}

/// Encode a `chunk` event frame wrapping the given model JSON.
#[cfg(test)]
pub(crate) fn encode_chunk(json: &str) -> Vec<u8> {
    let payload = serde_json::json!({ "bytes": STANDARD.encode(json) }).to_string();
    encode_frame(
        &[
            (":message-type", "event"),
            (":event-type", "chunk"),
            (":content-type", "application/json"),
        ],
        payload.as_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(data: &[u8]) -> Result<Vec<Frame>> {
        let mut decoder = FrameDecoder::new();
        decoder.extend(data);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame()? {
            frames.push(frame);
        }
        decoder.finish()?;
        Ok(frames)
    }

    #[test]
    fn test_chunk_frame() {
        let frames = decode_all(&encode_chunk(r#"{"delta":{"text":"hi"}}"#)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header_str(":event-type"), Some("chunk"));
        let event = frames.into_iter().next().unwrap().into_event().unwrap();
        assert_eq!(
            event,
            StreamEvent::Chunk(br#"{"delta":{"text":"hi"}}"#.to_vec())
        );
    }

    #[test]
    fn test_frames_split_across_reads() {
        let mut data = encode_chunk(r#"{"delta":{"text":"a"}}"#);
        data.extend(encode_chunk(r#"{"delta":{"text":"b"}}"#));

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for piece in data.chunks(5) {
            decoder.extend(piece);
            while let Some(frame) = decoder.next_frame().unwrap() {
                events.push(frame.into_event().unwrap());
            }
        }
        decoder.finish().unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_unknown_event_type() {
        let data = encode_frame(
            &[(":message-type", "event"), (":event-type", "metrics")],
            b"{}",
        );
        let frame = decode_all(&data).unwrap().remove(0);
        assert_eq!(
            frame.into_event().unwrap(),
            StreamEvent::UnknownVariant("metrics".to_string())
        );
    }

    #[test]
    fn test_missing_message_type_is_unrecognized() {
        let data = encode_frame(&[(":content-type", "application/json")], b"{}");
        let frame = decode_all(&data).unwrap().remove(0);
        assert_eq!(frame.into_event().unwrap(), StreamEvent::Unrecognized);
    }

    #[test]
    fn test_exception_frame_is_invocation_error() {
        let data = encode_frame(
            &[
                (":message-type", "exception"),
                (":exception-type", "throttlingException"),
            ],
            br#"{"message":"Too many requests"}"#,
        );
        let frame = decode_all(&data).unwrap().remove(0);
        match frame.into_event() {
            Err(Error::Invocation(msg)) => {
                assert_eq!(msg, "throttlingException: Too many requests")
            }
            other => panic!("expected invocation error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_chunk_wrapper_is_malformed_chunk() {
        let data = encode_frame(
            &[(":message-type", "event"), (":event-type", "chunk")],
            br#"{"bytes":"!!not base64!!"}"#,
        );
        let frame = decode_all(&data).unwrap().remove(0);
        assert!(matches!(frame.into_event(), Err(Error::MalformedChunk(_))));
    }

    #[test]
    fn test_truncated_body() {
        let data = encode_chunk(r#"{"delta":{"text":"a"}}"#);
        let err = decode_all(&data[..data.len() - 3]).unwrap_err();
        assert!(matches!(err, Error::Invocation(_)));
    }

    #[test]
    fn test_corrupt_prelude() {
        let mut data = vec![0, 0, 0, 4, 0, 0, 0, 0];
        data.extend_from_slice(&crc32fast::hash(&data).to_be_bytes());
        data.extend_from_slice(&[0; 4]);
        assert!(matches!(decode_all(&data), Err(Error::Invocation(_))));
    }

    #[test]
    fn test_prelude_checksum_mismatch() {
        let mut data = encode_chunk(r#"{"delta":{"text":"a"}}"#);
        data[9] ^= 0xff;
        let err = decode_all(&data).unwrap_err();
        assert!(matches!(err, Error::Invocation(ref msg) if msg.contains("prelude checksum")));
    }

    #[test]
    fn test_message_checksum_mismatch() {
        let mut data = encode_chunk(r#"{"delta":{"text":"a"}}"#);
        let payload_byte = data.len() - 10;
        data[payload_byte] ^= 0x01;
        let err = decode_all(&data).unwrap_err();
        assert!(matches!(err, Error::Invocation(ref msg) if msg.contains("message checksum")));
    }

    #[test]
    fn test_non_string_headers_are_skipped() {
        let mut header_bytes = Vec::new();
        header_bytes.push(4);
        header_bytes.extend_from_slice(b"flag");
        header_bytes.push(0);
        header_bytes.push(3);
        header_bytes.extend_from_slice(b"num");
        header_bytes.push(4);
        header_bytes.extend_from_slice(&42i32.to_be_bytes());
        header_bytes.push(2);
        header_bytes.extend_from_slice(b"id");
        header_bytes.push(9);
        header_bytes.extend_from_slice(&[7; 16]);
        header_bytes.push(4);
        header_bytes.extend_from_slice(b"kind");
        header_bytes.push(7);
        header_bytes.extend_from_slice(&5u16.to_be_bytes());
        header_bytes.extend_from_slice(b"chunk");
        let mut buf = Bytes::from(header_bytes);

        let headers = parse_headers(&mut buf).unwrap();
        assert_eq!(headers, vec![("kind".to_string(), "chunk".to_string())]);
    }

    #[test]
    fn test_truncated_header_value() {
        let mut buf = Bytes::from_static(b"\x03num\x04\x00\x01");
        assert!(matches!(parse_headers(&mut buf), Err(Error::Invocation(_))));
    }
}
