pub mod ack;
pub mod config;
pub mod control;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use ack::{Ack, AckError};
pub use config::{SimConfig, TransferConfig};
pub use control::{Command, ControlError, FileRequest, RequestReply};
pub use interface::Datagram;
pub use packet::{HEADER_LEN, PACKET_SIZE, PAYLOAD_CAPACITY, Packet, PacketError};

pub use scenario::{
    PayloadSpec, SimConfigOverride, TestAction, TestAssertion, TestScenario,
};
