//! Window-paced stop-and-wait sender.
//!
//! A transfer proceeds in rounds. Each round sends up to `round(window)`
//! packets, waiting for one acknowledgment after every packet. A packet whose
//! acknowledgment does not arrive within the timeout is resent until one does.
//! Three identical acknowledgments in a row mark the packet they name as lost:
//! it is resent, the window collapses, and the round ends early. Once every
//! packet has been sent, packets named by the cumulative acknowledgment are
//! resent one at a time until the receiver confirms the whole blob.

use bytes::Bytes;
use serde::Serialize;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use myftp_abstract::ack::MAX_ACK_LEN;
use myftp_abstract::{Ack, Datagram, TransferConfig};

use crate::cancel::CancelToken;
use crate::congestion::CongestionController;
use crate::dup_ack::{AckSignal, DupAckTracker};
use crate::error::TransferError;
use crate::segment::Segments;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RoundSample {
    pub burst: u32,
    pub ssthresh: f64,
}

/// Counters of one finished (or aborted) send.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendReport {
    pub total_packets: u32,
    pub datagrams_sent: u32,
    pub retransmissions: u32,
    pub timeouts: u32,
    pub loss_events: u32,
    pub discarded_acks: u32,
    pub rounds: Vec<RoundSample>,
}

impl SendReport {
    pub fn max_burst(&self) -> u32 {
        self.rounds.iter().map(|r| r.burst).max().unwrap_or(0)
    }
}

pub struct Sender {
    config: TransferConfig,
    report: SendReport,
}

impl Sender {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            report: SendReport::default(),
        }
    }

    pub fn report(&self) -> &SendReport {
        &self.report
    }

    /// Deliver `blob` over `link`, returning once the receiver has
    /// acknowledged every packet.
    pub async fn send<L: Datagram>(
        &mut self,
        link: &L,
        blob: Bytes,
        cancel: &CancelToken,
    ) -> Result<(), TransferError> {
        let segments = Segments::new(blob)?;
        let mut transmission = Transmission {
            link,
            cancel,
            config: &self.config,
            controller: CongestionController::new(self.config.initial_ssthresh),
            dup_acks: DupAckTracker::new(self.config.dup_ack_threshold),
            next_seq: 0,
            last_ack: 0,
            report: SendReport {
                total_packets: segments.total(),
                ..Default::default()
            },
            segments,
        };
        let result = transmission.run().await;
        self.report = transmission.report;
        result
    }
}

struct Transmission<'a, L> {
    link: &'a L,
    cancel: &'a CancelToken,
    config: &'a TransferConfig,
    segments: Segments,
    controller: CongestionController,
    dup_acks: DupAckTracker,
    /// Lowest sequence never sent.
    next_seq: u32,
    /// Highest cumulative acknowledgment seen.
    last_ack: u32,
    report: SendReport,
}

impl<L: Datagram> Transmission<'_, L> {
    async fn run(&mut self) -> Result<(), TransferError> {
        let total = self.segments.total();
        info!(
            bytes = self.segments.blob_len(),
            total_packets = total,
            "sending"
        );

        loop {
            let burst = self.controller.begin_round();
            self.report.rounds.push(RoundSample {
                burst,
                ssthresh: self.controller.ssthresh(),
            });
            debug!(window = burst, ssthresh = self.controller.ssthresh(), "round");

            let mut sent_final = false;
            for _ in 0..burst {
                if self.next_seq >= total {
                    self.drain_backlog().await?;
                    self.finish();
                    return Ok(());
                }

                let seq = self.next_seq;
                let ack = self.dispatch(seq, true).await?;
                self.next_seq += 1;
                sent_final = self.next_seq == total;

                if let AckSignal::Loss { stalled } = self.dup_acks.observe(ack) {
                    self.recover(stalled).await?;
                    sent_final = false;
                    break;
                }
                self.controller.on_ack();
            }

            if sent_final && self.last_ack >= total {
                self.finish();
                return Ok(());
            }
        }
    }

    fn finish(&self) {
        info!(
            datagrams = self.report.datagrams_sent,
            retransmissions = self.report.retransmissions,
            timeouts = self.report.timeouts,
            "transfer acknowledged"
        );
    }

    async fn recover(&mut self, stalled: u32) -> Result<(), TransferError> {
        self.report.loss_events += 1;
        warn!(
            stalled,
            window = self.controller.window(),
            "duplicate acknowledgments, retransmitting"
        );
        self.dispatch(stalled, false).await?;
        self.controller.on_loss();
        self.dup_acks.reset();
        debug!(
            window = self.controller.window(),
            ssthresh = self.controller.ssthresh(),
            "window reset"
        );
        Ok(())
    }

    /// Resend whatever the receiver still reports missing, one packet at a
    /// time, until the cursor passes the last packet.
    async fn drain_backlog(&mut self) -> Result<(), TransferError> {
        while self.last_ack < self.segments.total() {
            let lost = self.last_ack;
            debug!(seq = lost, "resending unacknowledged packet");
            self.dispatch(lost, false).await?;
        }
        Ok(())
    }

    /// Send packet `seq` and block until an acknowledgment arrives, resending
    /// after every timeout.
    async fn dispatch(&mut self, seq: u32, fresh: bool) -> Result<u32, TransferError> {
        let datagram = self.segments.datagram(seq)?;
        if !fresh {
            self.report.retransmissions += 1;
        }
        loop {
            self.link.send(&datagram).await?;
            self.report.datagrams_sent += 1;
            trace!(seq, size = datagram.len(), "sent packet");

            if let Some(ack) = self.await_ack().await? {
                trace!(seq, ack, "acknowledged");
                self.last_ack = self.last_ack.max(ack);
                return Ok(ack);
            }
            self.report.timeouts += 1;
            self.report.retransmissions += 1;
            debug!(seq, "acknowledgment timed out, resending");
        }
    }

    /// Wait for the next plausible acknowledgment; `None` on timeout.
    async fn await_ack(&mut self) -> Result<Option<u32>, TransferError> {
        let deadline = Instant::now() + self.config.ack_timeout();
        let total = self.segments.total();
        let mut buf = [0u8; MAX_ACK_LEN];
        loop {
            let received = self
                .cancel
                .guard(time::timeout_at(deadline, self.link.recv(&mut buf)))
                .await?;
            let Ok(len) = received else {
                return Ok(None);
            };
            match Ack::decode(&buf[..len?]) {
                Ok(Ack(ack)) if ack <= total => return Ok(Some(ack)),
                Ok(Ack(ack)) => {
                    self.report.discarded_acks += 1;
                    warn!(ack, total, "discarding out-of-range acknowledgment");
                }
                Err(err) => {
                    self.report.discarded_acks += 1;
                    debug!(%err, "discarding datagram while awaiting acknowledgment");
                }
            }
        }
    }
}
