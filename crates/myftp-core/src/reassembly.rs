//! Receiver-side reassembly buffer and gap tracking.
//!
//! Invariants kept by [`Reassembly::accept`]:
//! - every sequence in the gap queue has an empty slot, and leaves the queue
//!   exactly when that slot is filled;
//! - the gap queue holds every empty slot below the highest sequence received;
//! - `ack` is the gap queue head, or one past the highest sequence received
//!   when the queue is empty.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use myftp_abstract::{Packet, PacketError};

use crate::error::TransferError;

/// Missing sequence numbers in discovery order, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct GapQueue {
    order: VecDeque<u32>,
    members: HashSet<u32>,
}

impl GapQueue {
    /// Append `seq` unless it is already queued.
    pub fn push_back(&mut self, seq: u32) -> bool {
        if !self.members.insert(seq) {
            return false;
        }
        self.order.push_back(seq);
        true
    }

    pub fn remove(&mut self, seq: u32) -> bool {
        if !self.members.remove(&seq) {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|s| *s == seq) {
            self.order.remove(pos);
        }
        true
    }

    pub fn front(&self) -> Option<u32> {
        self.order.front().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.order.iter().copied()
    }
}

/// Outcome of a packet that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub seq: u32,
    /// Cursor to acknowledge after this packet.
    pub ack: u32,
    /// The slot already held this packet.
    pub duplicate: bool,
}

#[derive(Debug, Clone)]
pub struct Reassembly {
    slots: Vec<Option<Bytes>>,
    gaps: GapQueue,
    ack: u32,
    max_received: Option<u32>,
    eof: bool,
}

impl Reassembly {
    pub fn new(total_packets: u32) -> Self {
        Self {
            slots: vec![None; total_packets as usize],
            gaps: GapQueue::default(),
            ack: 0,
            max_received: None,
            eof: false,
        }
    }

    pub fn total(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn ack(&self) -> u32 {
        self.ack
    }

    pub fn gaps(&self) -> &GapQueue {
        &self.gaps
    }

    pub fn max_received(&self) -> Option<u32> {
        self.max_received
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn has(&self, seq: u32) -> bool {
        self.slots.get(seq as usize).is_some_and(Option::is_some)
    }

    /// End of file has been seen and nothing below it is missing.
    pub fn is_complete(&self) -> bool {
        self.eof && self.gaps.is_empty()
    }

    /// Validate one datagram and fold it into the buffer.
    ///
    /// Datagrams that fail here must not be acknowledged.
    pub fn accept(&mut self, datagram: &[u8]) -> Result<Accepted, PacketError> {
        let packet = Packet::decode(datagram)?;
        packet.verify()?;
        let total = self.total();
        if packet.seq >= total {
            return Err(PacketError::OutOfRange {
                seq: packet.seq,
                total,
            });
        }

        let seq = packet.seq;
        self.eof |= packet.is_final() || seq + 1 == total;
        let slot = &mut self.slots[seq as usize];
        let duplicate = slot.is_some();
        *slot = Some(Bytes::from(packet.payload));
        let max_received = self.max_received.map_or(seq, |max| max.max(seq));
        self.max_received = Some(max_received);

        if seq != self.ack {
            self.gaps.remove(seq);
            for missing in self.ack..seq {
                if self.slots[missing as usize].is_none() {
                    self.gaps.push_back(missing);
                }
            }
        } else {
            if self.gaps.front() == Some(seq) {
                self.gaps.remove(seq);
            }
            self.ack = self.gaps.front().unwrap_or(max_received + 1);
        }

        Ok(Accepted {
            seq,
            ack: self.ack,
            duplicate,
        })
    }

    /// Concatenate the payloads in sequence order.
    pub fn into_blob(self) -> Result<Vec<u8>, TransferError> {
        let mut blob = Vec::with_capacity(self.slots.iter().flatten().map(Bytes::len).sum());
        for (seq, slot) in self.slots.into_iter().enumerate() {
            let payload = slot.ok_or(TransferError::Incomplete(seq as u32))?;
            blob.extend_from_slice(&payload);
        }
        Ok(blob)
    }
}
