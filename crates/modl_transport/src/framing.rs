//! ETX message framing
//!
//! Every message is UTF-8 JSON followed by a single `0x03` byte. The reader
//! accumulates chunks until at least one terminator has arrived and keeps
//! the second-to-last segment of the buffer:
//!
//! ```text
//! {"type":"ACT"}\x03             -> ["{..}", ""]          -> {"type":"ACT"}
//! {"a":1}\x03{"b":2}\x03         -> ["{a}", "{b}", ""]    -> {"b":2}
//! {"a":1}\x03{"b":2}\x03{"c"     -> ["{a}", "{b}", "{c"]  -> {"b":2}
//! ```
//!
//! The Brain never has more than one reply in flight, so at most two
//! complete segments may be buffered. Anything beyond that is a
//! [`TransportError::Protocol`] error instead of a silent misparse.

use crate::{TransportError, TransportResult};

/// End-of-text message terminator
pub const ETX: u8 = 0x03;

/// Size of a single socket read
pub const RECEIVE_CHUNK_SIZE: usize = 1024;

/// Most complete messages a single receive may hold
const MAX_COMPLETE_SEGMENTS: usize = 2;

/// Append the terminator to a serialized message
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend_from_slice(payload);
    frame.push(ETX);
    frame
}

/// Receive buffer for one message
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// True once a terminator has been buffered
    pub fn has_frame(&self) -> bool {
        self.buf.contains(&ETX)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the message out of the buffer, leaving it empty.
    ///
    /// Returns `Ok(None)` when no terminator has arrived yet.
    pub fn take_message(&mut self) -> TransportResult<Option<String>> {
        if !self.has_frame() {
            return Ok(None);
        }

        let buf = std::mem::take(&mut self.buf);
        let segments: Vec<&[u8]> = buf.split(|b| *b == ETX).collect();
        let complete = segments.len() - 1;
        if complete > MAX_COMPLETE_SEGMENTS {
            return Err(TransportError::Protocol(format!(
                "{} complete messages buffered, expected at most {}",
                complete, MAX_COMPLETE_SEGMENTS
            )));
        }

        let trailing = segments[segments.len() - 1];
        if !trailing.is_empty() {
            log::warn!(
                "{} Discarding {} bytes of a partial message",
                modl_core::LOG_PREFIX,
                trailing.len()
            );
        }

        let message = segments[segments.len() - 2];
        String::from_utf8(message.to_vec())
            .map(Some)
            .map_err(|e| TransportError::Protocol(format!("message is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(bytes: &[u8]) -> TransportResult<Option<String>> {
        let mut buffer = FrameBuffer::new();
        buffer.extend(bytes);
        buffer.take_message()
    }

    #[test]
    fn test_encode_appends_terminator() {
        assert_eq!(encode_frame(b"{}"), vec![b'{', b'}', ETX]);
    }

    #[test]
    fn test_incomplete_message_waits() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"{\"type\":");
        assert_eq!(buffer.take_message().unwrap(), None);
        assert_eq!(buffer.len(), 8);

        buffer.extend(b"\"ACT\"}\x03");
        assert_eq!(buffer.take_message().unwrap().as_deref(), Some("{\"type\":\"ACT\"}"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_two_messages_keep_the_latest() {
        assert_eq!(take(b"first\x03second\x03").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_trailing_partial_is_dropped() {
        assert_eq!(take(b"done\x03part").unwrap().as_deref(), Some("done"));
    }

    #[test]
    fn test_three_messages_is_protocol_error() {
        let err = take(b"a\x03b\x03c\x03").unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_invalid_utf8_is_protocol_error() {
        let err = take(&[0xff, 0xfe, ETX]).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
