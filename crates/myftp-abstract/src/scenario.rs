use crate::config::SimConfig;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub payload: PayloadSpec,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

/// The blob a scenario transfers.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadSpec {
    /// Literal UTF-8 text.
    Text { data: String },
    /// `len` bytes counting up modulo 251, so misplaced chunks are detectable.
    Pattern { len: usize },
}

impl PayloadSpec {
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            PayloadSpec::Text { data } => data.as_bytes().to_vec(),
            PayloadSpec::Pattern { len } => (0..*len).map(|i| (i % 251) as u8).collect(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Deterministically drop the first packet sent by Sender with given seq number
    DropNextFromSenderSeq { seq: u32 },
    /// Deterministically drop the first ACK sent by Receiver with given ack number
    DropNextFromReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// The receiver reassembled exactly the payload
    DataDelivered,
    /// Total datagrams sent by the Sender engine, retransmissions included
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Largest burst size used by the Sender in any round
    SenderWindowMax { min: u32, max: Option<u32> },
    /// Packets sent again after a timeout, a loss signal, or while draining
    Retransmissions { min: u32, max: Option<u32> },
    /// Assert that the transfer finishes within time
    MaxDuration { ms: u64 },
}
