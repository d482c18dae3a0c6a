//! Wire format of data packets.
//!
//! ```text
//!  0       4                                                    68         ≤512
//!  +-------+----------------------------------------------------+-----------+
//!  |  seq  |        digest (ASCII hex SHA-256 of payload)       |  payload  |
//!  +-------+----------------------------------------------------+-----------+
//! ```
//!
//! The sequence number is little-endian. Every packet except the last one of a
//! transfer is exactly [`PACKET_SIZE`] bytes, so a shorter datagram marks the
//! end of the file. The digest only covers the payload.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Size of a full data datagram.
pub const PACKET_SIZE: usize = 512;
pub const SEQ_LEN: usize = 4;
pub const DIGEST_LEN: usize = 64;
/// seq(4) + digest(64)
pub const HEADER_LEN: usize = SEQ_LEN + DIGEST_LEN;
/// Payload bytes carried by every non-final packet.
pub const PAYLOAD_CAPACITY: usize = PACKET_SIZE - HEADER_LEN;

/// Hex-encoded SHA-256 digest as it appears on the wire.
pub type HexDigest = [u8; DIGEST_LEN];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("malformed packet: {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    Malformed { len: usize },
    #[error("integrity mismatch on packet #{seq}")]
    IntegrityMismatch { seq: u32 },
    #[error("packet #{seq} is outside a transfer of {total} packets")]
    OutOfRange { seq: u32, total: u32 },
    #[error("payload of {len} bytes exceeds the {PAYLOAD_CAPACITY}-byte capacity")]
    PayloadTooLarge { len: usize },
}

/// Compute the wire digest of `payload`.
pub fn digest(payload: &[u8]) -> HexDigest {
    let encoded = hex::encode(Sha256::digest(payload));
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Recompute the digest of `payload` and compare it with `expected`.
pub fn verify(payload: &[u8], expected: &HexDigest) -> bool {
    digest(payload) == *expected
}

/// Serialise a data packet without building an intermediate [`Packet`].
pub fn encode(seq: u32, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    write_datagram(seq, &digest(payload), payload)
}

fn write_datagram(seq: u32, digest: &HexDigest, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    if payload.len() > PAYLOAD_CAPACITY {
        return Err(PacketError::PayloadTooLarge { len: payload.len() });
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(digest);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Whether `buf` is shaped like a data packet: a full header whose digest
/// field is hex text. Session datagrams never are.
pub fn has_data_header(buf: &[u8]) -> bool {
    buf.len() >= HEADER_LEN && buf[SEQ_LEN..HEADER_LEN].iter().all(u8::is_ascii_hexdigit)
}

/// Read only the sequence number of a datagram, if it has a full header.
pub fn peek_seq(buf: &[u8]) -> Option<u32> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u32,
    pub digest: HexDigest,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, computing the digest of `payload`.
    pub fn new(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            digest: digest(&payload),
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        write_datagram(self.seq, &self.digest, &self.payload)
    }

    /// Split a datagram into header fields and payload.
    ///
    /// The digest is not checked here; call [`Packet::verify`] before trusting
    /// any field.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let seq = peek_seq(buf).ok_or(PacketError::Malformed { len: buf.len() })?;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&buf[SEQ_LEN..HEADER_LEN]);
        Ok(Self {
            seq,
            digest,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

    pub fn verify(&self) -> Result<(), PacketError> {
        if verify(&self.payload, &self.digest) {
            Ok(())
        } else {
            Err(PacketError::IntegrityMismatch { seq: self.seq })
        }
    }

    /// A packet shorter than [`PACKET_SIZE`] ends the transfer.
    pub fn is_final(&self) -> bool {
        self.payload.len() < PAYLOAD_CAPACITY
    }
}
