//! Fixed 140-byte alarm datagram layout: encode/decode, pure and stateless.
//!
//! Layout (offsets in bytes, each slot left-justified and zero-padded):
//!
//! | offset | len | field   |
//! |--------|-----|---------|
//! | 0      | 4   | header  |
//! | 4      | 20  | process |
//! | 24     | 12  | source  |
//! | 36     | 12  | code    |
//! | 48     | 80  | payload |
//! | 128    | 12  | node    |
//!
//! This layout is the compatibility surface with the central event handler
//! and must stay bit-exact.

use crate::alarm::event::{
    AlarmEvent, CODE_CAP, NODE_CAP, PAYLOAD_CAP, PROCESS_CAP, SOURCE_CAP,
};
use crate::core::errors::SentryError;

/// Exact datagram length; anything else is rejected on decode.
pub const FRAME_LEN: usize = 140;

/// Magic/version header at offset 0.
pub const HEADER: [u8; 4] = [0x21, 0x03, 0x00, 0xC9];

const PROCESS_AT: usize = 4;
const SOURCE_AT: usize = 24;
const CODE_AT: usize = 36;
const PAYLOAD_AT: usize = 48;
const NODE_AT: usize = 128;

/// Why a received buffer is not an alarm datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("alarm datagram must be exactly 140 bytes, got {actual}")]
    Length { actual: usize },
    #[error("alarm datagram header mismatch: {found:02x?}")]
    Header { found: [u8; 4] },
}

impl From<DecodeError> for SentryError {
    fn from(err: DecodeError) -> Self {
        Self::Decode {
            details: err.to_string(),
        }
    }
}

/// Encode an event into one wire frame.
///
/// Never fails: event fields are already clamped to their slot widths, and
/// the slot width stays the hard bound here regardless.
#[must_use]
pub fn encode(event: &AlarmEvent) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..HEADER.len()].copy_from_slice(&HEADER);
    put(&mut frame, PROCESS_AT, PROCESS_CAP, event.process());
    put(&mut frame, SOURCE_AT, SOURCE_CAP, event.source());
    put(&mut frame, CODE_AT, CODE_CAP, event.code());
    put(&mut frame, PAYLOAD_AT, PAYLOAD_CAP, event.payload());
    put(&mut frame, NODE_AT, NODE_CAP, event.node());
    frame
}

/// Decode one wire frame back into an event.
///
/// Field slots are read up to the first NUL; invalid UTF-8 decodes lossily.
/// The receiving side is tolerant by contract: only length and header are
/// hard failures.
pub fn decode(buffer: &[u8]) -> Result<AlarmEvent, DecodeError> {
    if buffer.len() != FRAME_LEN {
        return Err(DecodeError::Length {
            actual: buffer.len(),
        });
    }
    if buffer[..HEADER.len()] != HEADER {
        let mut found = [0u8; 4];
        found.copy_from_slice(&buffer[..HEADER.len()]);
        return Err(DecodeError::Header { found });
    }
    Ok(AlarmEvent::new(
        field(buffer, PROCESS_AT, PROCESS_CAP),
        field(buffer, SOURCE_AT, SOURCE_CAP),
        field(buffer, CODE_AT, CODE_CAP),
        field(buffer, PAYLOAD_AT, PAYLOAD_CAP),
        field(buffer, NODE_AT, NODE_CAP),
    ))
}

fn put(frame: &mut [u8; FRAME_LEN], at: usize, cap: usize, text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(cap);
    frame[at..at + len].copy_from_slice(&bytes[..len]);
}

fn field(buffer: &[u8], at: usize, cap: usize) -> String {
    let slot = &buffer[at..at + cap];
    let end = memchr::memchr(0, slot).unwrap_or(cap);
    String::from_utf8_lossy(&slot[..end]).into_owned()
}
