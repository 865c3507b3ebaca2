//! Content-Length framing as a tokio-util codec.
//!
//! Each frame is a header `Content-Length: <N>\r\n\r\n` followed by exactly
//! N bytes of UTF-8 JSON.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::{Message, OutgoingMessage};

/// Default maximum body size (16 MB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AdapterCodec {
    max_message_size: usize,
}

impl AdapterCodec {
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Bodies larger than `max_message_size` are rejected with
    /// [`CodecError::MessageTooLarge`].
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for AdapterCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AdapterCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Zero-length bodies are legal no-ops, so a single call may have to
        // step over several frames before producing a message.
        loop {
            let Some(header_end) = find_header_end(src) else {
                return Ok(None);
            };

            let content_length = parse_content_length(&src[..header_end])?;

            if content_length > self.max_message_size {
                return Err(CodecError::MessageTooLarge {
                    size: content_length,
                    max: self.max_message_size,
                });
            }

            let body_start = header_end + 4;
            let total_length = body_start + content_length;

            if src.len() < total_length {
                src.reserve(total_length - src.len());
                return Ok(None);
            }

            if content_length == 0 {
                src.advance(total_length);
                continue;
            }

            let parsed = serde_json::from_slice(&src[body_start..total_length]);
            // Consume the frame either way; a bad body must not
            // desynchronize subsequent frames.
            src.advance(total_length);

            return match parsed {
                Ok(message) => Ok(Some(message)),
                Err(e) => Err(CodecError::JsonDeserialize(e)),
            };
        }
    }
}

impl Encoder<OutgoingMessage> for AdapterCodec {
    type Error = CodecError;

    fn encode(&mut self, item: OutgoingMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(CodecError::JsonSerialize)?;

        dst.reserve(32 + json.len());
        dst.put_slice(b"Content-Length: ");
        dst.put_slice(json.len().to_string().as_bytes());
        dst.put_slice(b"\r\n\r\n");
        dst.put_slice(&json);

        Ok(())
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_content_length(header: &[u8]) -> Result<usize, CodecError> {
    let header = std::str::from_utf8(header).map_err(|_| CodecError::InvalidUtf8)?;

    for line in header.split("\r\n") {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            return value
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedContentLength);
        }
    }

    Err(CodecError::MissingContentLength)
}
