use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of the reliability engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// How long the sender waits for an acknowledgment before resending.
    pub ack_timeout_ms: u64,
    /// Slow-start threshold of a fresh congestion controller.
    pub initial_ssthresh: f64,
    /// Identical acknowledgments in a row that count as a loss.
    pub dup_ack_threshold: u32,
    /// Quiet period the receiver keeps re-acknowledging after completion.
    pub linger_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            initial_ssthresh: 100.0,
            dup_ack_threshold: 3,
            linger_ms: 10_000,
        }
    }
}

impl TransferConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

/// Impairments applied by the simulated link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            seed: 0,
        }
    }
}
