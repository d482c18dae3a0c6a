//! Partitioning of a blob into packet payloads.

use bytes::Bytes;
use myftp_abstract::packet::{self, PAYLOAD_CAPACITY, PacketError};

use crate::error::TransferError;

/// Largest transfer either engine accepts, about 1.8 GiB of payload.
pub const MAX_PACKETS: u32 = 1 << 22;

/// Number of packets needed to carry `len` bytes.
///
/// An empty blob still takes one (empty) final packet so the receiver sees an
/// end-of-file marker.
pub fn total_packets(len: usize) -> usize {
    len.div_ceil(PAYLOAD_CAPACITY).max(1)
}

/// A blob viewed as `total()` payload slices of [`PAYLOAD_CAPACITY`] bytes,
/// the last one holding the remainder.
#[derive(Debug, Clone)]
pub struct Segments {
    blob: Bytes,
    total: u32,
}

impl Segments {
    pub fn new(blob: Bytes) -> Result<Self, TransferError> {
        let total = u32::try_from(total_packets(blob.len()))
            .ok()
            .filter(|&total| total <= MAX_PACKETS)
            .ok_or(TransferError::TooLarge(blob.len()))?;
        Ok(Self { blob, total })
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn blob_len(&self) -> usize {
        self.blob.len()
    }

    /// Payload of packet `seq`; `seq` must be below [`Segments::total`].
    pub fn payload(&self, seq: u32) -> Bytes {
        debug_assert!(seq < self.total);
        let start = (seq as usize * PAYLOAD_CAPACITY).min(self.blob.len());
        let end = (start + PAYLOAD_CAPACITY).min(self.blob.len());
        self.blob.slice(start..end)
    }

    /// Wire form of packet `seq`.
    pub fn datagram(&self, seq: u32) -> Result<Vec<u8>, PacketError> {
        packet::encode(seq, &self.payload(seq))
    }

    pub fn iter(&self) -> impl Iterator<Item = Bytes> + '_ {
        (0..self.total).map(|seq| self.payload(seq))
    }
}
