//! Spike encoding and decoding for cross-rank transport.
//!
//! # Wire Format
//!
//! Spike payloads are a flat array of fixed-size records with no header and
//! no padding:
//!
//! ```text
//! [dst: u32 LE][time: f64 LE] [dst: u32 LE][time: f64 LE] ...
//!  \_______ 12 bytes _______/
//! ```
//!
//! Both the size collective and the variable-size gather of an exchange count
//! in units of this record, so the element size must never change between them.

use crate::Gid;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A spike travelling between ranks: the wire twin of [`crate::Event`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeItem {
    /// Presynaptic endpoint the spike is addressed to.
    pub dst: Gid,
    /// Delivery time in simulation steps.
    pub time: f64,
}

impl SpikeItem {
    /// Encoded size of a single record.
    pub const WIRE_SIZE: usize = 4 + 8;

    pub fn new(dst: Gid, time: f64) -> Self {
        Self { dst, time }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.dst.0);
        buf.put_f64_le(self.time);
    }
}

/// Errors that can occur while decoding a spike payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("Spike payload of {len} bytes is not a multiple of {record} bytes")]
    Truncated { len: usize, record: usize },
}

/// Encode spikes into a contiguous payload.
pub fn encode_spikes(items: &[SpikeItem]) -> Bytes {
    let mut buf = BytesMut::with_capacity(items.len() * SpikeItem::WIRE_SIZE);
    for item in items {
        item.put(&mut buf);
    }
    buf.freeze()
}

/// Decode a payload produced by [`encode_spikes`].
pub fn decode_spikes(mut data: &[u8]) -> Result<Vec<SpikeItem>, WireError> {
    if data.len() % SpikeItem::WIRE_SIZE != 0 {
        return Err(WireError::Truncated {
            len: data.len(),
            record: SpikeItem::WIRE_SIZE,
        });
    }

    let mut items = Vec::with_capacity(data.len() / SpikeItem::WIRE_SIZE);
    while data.has_remaining() {
        let dst = Gid(data.get_u32_le());
        let time = data.get_f64_le();
        items.push(SpikeItem { dst, time });
    }
    Ok(items)
}
