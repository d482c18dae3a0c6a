use anyhow::{Context, Result, bail};
use bytes::Bytes;
use tokio::time::{self, Duration, Instant};
use tracing::info;

use myftp_abstract::{SimConfig, TransferConfig};
use myftp_core::{CancelToken, Receiver, Sender, TransferError, total_packets};

use crate::link::SimLink;
use crate::trace::SimulationReport;

/// Upper bound on simulated time before a run is declared stuck.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3600);

/// One sender and one receiver engine wired together through a [`SimLink`].
pub struct Simulation {
    name: Option<String>,
    config: SimConfig,
    transfer: TransferConfig,
    drop_sender_seq_once: Vec<u32>,
    drop_receiver_ack_once: Vec<u32>,
    deadline: Duration,
}

pub struct SimulationOutcome {
    pub report: SimulationReport,
    pub delivered: Vec<u8>,
}

impl Simulation {
    pub fn new(config: SimConfig, transfer: TransferConfig) -> Self {
        Self {
            name: None,
            config,
            transfer,
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn add_drop_sender_seq_once(&mut self, seq: u32) {
        self.drop_sender_seq_once.push(seq);
    }

    pub fn add_drop_receiver_ack_once(&mut self, ack: u32) {
        self.drop_receiver_ack_once.push(ack);
    }

    /// Transfer `blob` end to end, then let the receiver linger until the
    /// link goes quiet. `duration_ms` in the report stops when the sender
    /// sees the whole blob acknowledged; `total_ms` includes the linger.
    pub async fn run(&self, blob: Bytes) -> Result<SimulationOutcome> {
        let (link, sender_end, receiver_end) = SimLink::pair(self.config.clone());
        for seq in &self.drop_sender_seq_once {
            link.add_drop_sender_seq_once(*seq);
        }
        for ack in &self.drop_receiver_ack_once {
            link.add_drop_receiver_ack_once(*ack);
        }

        let total = u32::try_from(total_packets(blob.len()))
            .context("blob needs more packets than a sequence number can count")?;
        info!(
            name = self.name.as_deref().unwrap_or("unnamed"),
            bytes = blob.len(),
            total_packets = total,
            "Starting simulation"
        );

        let cancel = CancelToken::new();
        let mut sender = Sender::new(self.transfer.clone());
        let mut receiver = Receiver::new(self.transfer.clone());
        let started = Instant::now();
        let transfer = async {
            let sending = async {
                let result = sender.send(&sender_end, blob.clone(), &cancel).await;
                (result, started.elapsed())
            };
            let receiving = async {
                let data = receiver.receive(&receiver_end, total, &cancel).await?;
                receiver.linger(&receiver_end, &cancel).await?;
                Ok::<_, TransferError>(data)
            };
            tokio::join!(sending, receiving)
        };

        let ((sent, elapsed), received) = match time::timeout(self.deadline, transfer).await {
            Ok(results) => results,
            Err(_) => {
                cancel.cancel();
                bail!("simulation did not finish within {:?}", self.deadline);
            }
        };
        sent.context("sender failed")?;
        let delivered = received.context("receiver failed")?;

        let delivered_intact = blob == delivered;
        let report = SimulationReport {
            name: self.name.clone(),
            config: self.config.clone(),
            transfer: self.transfer.clone(),
            duration_ms: elapsed.as_millis() as u64,
            total_ms: link.elapsed_ms(),
            blob_len: blob.len(),
            delivered_intact,
            sender: sender.report().clone(),
            receiver: receiver.report().clone(),
            link: link.counters(),
            link_events: link.events(),
        };
        info!(
            delivered_intact,
            duration_ms = report.duration_ms,
            datagrams = report.sender.datagrams_sent,
            "Simulation complete"
        );
        Ok(SimulationOutcome { report, delivered })
    }
}
