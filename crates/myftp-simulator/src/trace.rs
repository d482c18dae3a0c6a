use serde::Serialize;

use myftp_abstract::{SimConfig, TransferConfig};
use myftp_core::{ReceiveReport, SendReport};

use crate::link::{LinkCounters, LinkEventSummary};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub name: Option<String>,
    pub config: SimConfig,
    pub transfer: TransferConfig,
    pub duration_ms: u64,
    pub total_ms: u64,
    pub blob_len: usize,
    pub delivered_intact: bool,
    pub sender: SendReport,
    pub receiver: ReceiveReport,
    pub link: LinkCounters,
    pub link_events: Vec<LinkEventSummary>,
}
