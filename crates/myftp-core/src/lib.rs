//! Reliability engine: congestion-paced sender, reassembling receiver.
//!
//! Both engines talk to the far end only through a
//! [`Datagram`](myftp_abstract::Datagram) link and own all of their state, so
//! independent transfers can run side by side.

pub mod cancel;
pub mod congestion;
pub mod dup_ack;
pub mod error;
pub mod reassembly;
pub mod receiver;
pub mod segment;
pub mod sender;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use congestion::CongestionController;
pub use dup_ack::{AckSignal, DupAckTracker};
pub use error::TransferError;
pub use reassembly::{GapQueue, Reassembly};
pub use receiver::{ReceiveReport, Receiver};
pub use segment::{MAX_PACKETS, Segments, total_packets};
pub use sender::{RoundSample, SendReport, Sender};
