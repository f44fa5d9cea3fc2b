//! Bench payload generation: sequence-stamped header plus filler bytes.

use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed header size: sequence (u64) + send timestamp in unix ns (u64).
pub const HEADER_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadHeader {
    pub sequence: u64,
    pub sent_unix_ns: u64,
}

/// Generate a payload of at least `HEADER_LEN` bytes carrying the sequence
/// number and send timestamp, padded up to `size` with a repeating pattern.
pub fn generate_payload(sequence: u64, size: usize) -> Vec<u8> {
    let size = size.max(HEADER_LEN);
    let mut buf = Vec::with_capacity(size);
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&now_ns.to_be_bytes());
    for i in HEADER_LEN..size {
        buf.push((i & 0xff) as u8);
    }
    buf
}

/// Parse the header back out of a received payload. Returns `None` for
/// payloads shorter than the header.
pub fn parse_header(payload: &[u8]) -> Option<PayloadHeader> {
    if payload.len() < HEADER_LEN {
        return None;
    }
    let mut seq = [0u8; 8];
    let mut ts = [0u8; 8];
    seq.copy_from_slice(&payload[0..8]);
    ts.copy_from_slice(&payload[8..16]);
    Some(PayloadHeader {
        sequence: u64::from_be_bytes(seq),
        sent_unix_ns: u64::from_be_bytes(ts),
    })
}
