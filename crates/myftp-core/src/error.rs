use myftp_abstract::PacketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer cancelled")]
    Cancelled,
    #[error("datagram I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("{0} bytes exceed the largest transfer")]
    TooLarge(usize),
    #[error("peer announced {0} packets, more than the largest transfer")]
    TooManyPackets(u32),
    #[error("reassembly finished with packet #{0} missing")]
    Incomplete(u32),
}
