//! Frame encoding/decoding
//!
//! Pure translation between commands and wire bytes. Nothing here touches I/O.
//!
//! Outbound frame (always 6 bytes):
//! - 2 bytes: opcode (big-endian)
//! - 4 bytes: parameter (big-endian, signed)
//!
//! Inbound traffic is either the 4-byte acknowledgement `DONE` or a stream of
//! data frames `AA BB 00 00 | payload | EE FF`, where the payload is a run of
//! big-endian `u16` values.

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use super::{Command, ACK, DATA_HEAD, DATA_TAIL, FRAME_LEN};

/// Encode a command and its parameter into an outbound frame
pub fn encode(command: Command, parameter: i32) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    BigEndian::write_u16(&mut frame[0..2], command.opcode());
    BigEndian::write_i32(&mut frame[2..6], parameter);
    frame
}

/// Decode an outbound frame back into `(opcode, parameter)`
///
/// Returns `None` unless `frame` is exactly one frame long.
pub fn decode(frame: &[u8]) -> Option<(u16, i32)> {
    if frame.len() != FRAME_LEN {
        return None;
    }
    Some((
        BigEndian::read_u16(&frame[0..2]),
        BigEndian::read_i32(&frame[2..6]),
    ))
}

/// Check whether a response is exactly the positive acknowledgement
pub fn decode_ack(bytes: &[u8]) -> bool {
    bytes == ACK
}

/// Extract every value carried by the data frames in `bytes`.
///
/// The stream is split at each tail marker. Within a segment the payload
/// starts after the first head marker (or at the segment start when the head
/// was lost); any further head markers are removed, since they belong to
/// frames whose tail went missing. What remains is read as big-endian `u16`
/// pairs. A dangling odd byte is dropped with a warning; the stream is noisy
/// at frame boundaries.
pub fn decode_values(bytes: &[u8]) -> Vec<u16> {
    let mut values = Vec::new();

    for segment in segments(bytes) {
        let body = match find(segment, &DATA_HEAD) {
            Some(pos) => {
                if pos > 0 {
                    warn!(
                        fragment = %to_hex(&segment[..pos]),
                        "Dropping bytes ahead of data head"
                    );
                }
                &segment[pos + DATA_HEAD.len()..]
            }
            None => segment,
        };
        let payload = strip_heads(body);

        let mut groups = payload.chunks_exact(2);
        values.extend((&mut groups).map(BigEndian::read_u16));

        let rest = groups.remainder();
        if !rest.is_empty() {
            warn!(fragment = %to_hex(rest), "Failed to parse value fragment");
        }
    }

    values
}

/// Split `bytes` after the last tail marker.
///
/// The first half holds only complete frames; the second half is whatever
/// trails the final tail and may be the start of a frame still in flight.
pub fn split_at_last_tail(bytes: &[u8]) -> (&[u8], &[u8]) {
    match rfind(bytes, &DATA_TAIL) {
        Some(pos) => bytes.split_at(pos + DATA_TAIL.len()),
        None => (&[], bytes),
    }
}

/// Render bytes as uppercase hex without separators
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

/// Non-empty runs of bytes between tail markers
fn segments(bytes: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut rest = bytes;
    while let Some(pos) = find(rest, &DATA_TAIL) {
        if pos > 0 {
            out.push(&rest[..pos]);
        }
        rest = &rest[pos + DATA_TAIL.len()..];
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Copy of `bytes` with every head marker removed
fn strip_heads(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut rest = bytes;
    while let Some(pos) = find(rest, &DATA_HEAD) {
        out.extend_from_slice(&rest[..pos]);
        rest = &rest[pos + DATA_HEAD.len()..];
    }
    out.extend_from_slice(rest);
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
