//! Server-Sent-Events framing for session streams

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{EventKind, OutboundEvent};

/// Maximum buffered frame size (1 MB)
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// SSE codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// A decoded SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, if present
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Encodes outbound events as SSE frames
#[derive(Debug, Default)]
pub struct SseEncoder;

impl SseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<OutboundEvent> for SseEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: OutboundEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_event(&item, dst)
    }
}

fn encode_event(item: &OutboundEvent, dst: &mut BytesMut) -> Result<(), CodecError> {
    if item.body.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: item.body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    if item.kind == EventKind::KeepAlive {
        dst.put_slice(b": ping\r\n\r\n");
        return Ok(());
    }

    dst.reserve(item.body.len() + 32);
    if let Some(name) = item.kind.sse_name() {
        dst.put_slice(b"event: ");
        dst.put_slice(name.as_bytes());
        dst.put_slice(b"\r\n");
    }
    for line in item.body.split('\n') {
        dst.put_slice(b"data: ");
        dst.put_slice(line.trim_end_matches('\r').as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
    Ok(())
}

/// Decodes SSE frames, skipping comment-only frames
#[derive(Debug, Default)]
pub struct SseDecoder;

impl SseDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for SseDecoder {
    type Item = SseFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some((end, sep_len)) = find_frame_end(src) else {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(CodecError::FrameTooLarge {
                        size: src.len(),
                        max: MAX_FRAME_SIZE,
                    });
                }
                return Ok(None);
            };

            let raw = src.split_to(end + sep_len);
            let text = std::str::from_utf8(&raw[..end])?;

            let mut event = None;
            let mut data: Vec<&str> = Vec::new();
            for line in text.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value));
                }
                // comments (":") and unknown fields are ignored
            }

            if event.is_none() && data.is_empty() {
                continue;
            }

            return Ok(Some(SseFrame {
                event,
                data: data.join("\n"),
            }));
        }
    }
}

/// Locate the blank line ending a frame; returns (offset, separator length)
fn find_frame_end(src: &[u8]) -> Option<(usize, usize)> {
    let crlf = src.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    let lf = src.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
