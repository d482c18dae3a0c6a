//! Reactive receiver: validates, buffers and acknowledges every packet.

use serde::Serialize;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace};

use myftp_abstract::packet::has_data_header;
use myftp_abstract::{Ack, Datagram, PACKET_SIZE, Packet, TransferConfig};

use crate::cancel::CancelToken;
use crate::error::TransferError;
use crate::reassembly::Reassembly;
use crate::segment::MAX_PACKETS;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiveReport {
    pub total_packets: u32,
    pub accepted: u32,
    pub duplicates: u32,
    pub discarded: u32,
    pub acks_sent: u32,
    pub lingered_acks: u32,
}

pub struct Receiver {
    config: TransferConfig,
    report: ReceiveReport,
    final_ack: Option<u32>,
}

impl Receiver {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            report: ReceiveReport::default(),
            final_ack: None,
        }
    }

    pub fn report(&self) -> &ReceiveReport {
        &self.report
    }

    /// Collect `total_packets` packets from `link` and return the blob they
    /// carry. There is no timeout: only cancellation ends an unfinished
    /// transfer.
    pub async fn receive<L: Datagram>(
        &mut self,
        link: &L,
        total_packets: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, TransferError> {
        self.report = ReceiveReport {
            total_packets,
            ..Default::default()
        };
        self.final_ack = None;
        if total_packets == 0 {
            return Ok(Vec::new());
        }
        if total_packets > MAX_PACKETS {
            return Err(TransferError::TooManyPackets(total_packets));
        }

        info!(total_packets, "receiving");
        let mut state = Reassembly::new(total_packets);
        let mut buf = vec![0u8; PACKET_SIZE];
        while !state.is_complete() {
            let len = cancel.guard(link.recv(&mut buf)).await??;
            let accepted = match state.accept(&buf[..len]) {
                Ok(accepted) => accepted,
                Err(err) => {
                    self.report.discarded += 1;
                    debug!(%err, "discarding datagram");
                    continue;
                }
            };

            self.report.accepted += 1;
            if accepted.duplicate {
                self.report.duplicates += 1;
            }
            if accepted.seq != accepted.ack.wrapping_sub(1) {
                debug!(seq = accepted.seq, ack = accepted.ack, gaps = state.gaps().len(), "out of order");
            } else {
                trace!(seq = accepted.seq, size = len, "in order");
            }
            link.send(&Ack(accepted.ack).encode()).await?;
            self.report.acks_sent += 1;
        }

        self.final_ack = Some(state.ack());
        let blob = state.into_blob()?;
        info!(bytes = blob.len(), "transfer complete");
        Ok(blob)
    }

    /// Keep answering retransmitted packets with the final acknowledgment
    /// until no valid retransmission has arrived for the configured linger
    /// period.
    ///
    /// Covers the case where the last acknowledgment of [`Receiver::receive`]
    /// was lost and the sender is still retrying. Lingering stops early at the
    /// first datagram that is not a data packet; it belongs to whatever the
    /// peer does next and is returned to the caller.
    pub async fn linger<L: Datagram>(
        &mut self,
        link: &L,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>, TransferError> {
        let Some(ack) = self.final_ack else {
            return Ok(None);
        };
        let token = Ack(ack).encode();
        let mut buf = vec![0u8; PACKET_SIZE];
        let mut quiet_until = Instant::now() + self.config.linger();
        loop {
            let received = cancel
                .guard(time::timeout_at(quiet_until, link.recv(&mut buf)))
                .await?;
            let Ok(len) = received else {
                debug!("linger period elapsed");
                return Ok(None);
            };
            let datagram = &buf[..len?];
            if !has_data_header(datagram) {
                debug!(len = datagram.len(), "peer moved on, linger over");
                return Ok(Some(datagram.to_vec()));
            }
            match Packet::decode(datagram).and_then(|p| p.verify()) {
                Ok(()) => {
                    link.send(&token).await?;
                    self.report.lingered_acks += 1;
                    quiet_until = Instant::now() + self.config.linger();
                    debug!(ack, "re-acknowledged retransmission");
                }
                Err(err) => {
                    self.report.discarded += 1;
                    debug!(%err, "discarding datagram while lingering");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segments;
    use crate::testing::ScriptedLink;
    use bytes::Bytes;

    fn packets(blob: &[u8]) -> Vec<Vec<u8>> {
        let segments = Segments::new(Bytes::copy_from_slice(blob)).unwrap();
        (0..segments.total())
            .map(|seq| segments.datagram(seq).unwrap())
            .collect()
    }

    fn acks(link: &ScriptedLink) -> Vec<u32> {
        link.sent()
            .iter()
            .map(|d| Ack::decode(d).unwrap().0)
            .collect()
    }

    #[tokio::test]
    async fn reassembles_reordered_packets() {
        let blob: Vec<u8> = (0..1000).map(|i| (i % 97) as u8).collect();
        let p = packets(&blob);
        let link = ScriptedLink::preloaded([p[0].clone(), p[2].clone(), p[1].clone()]);

        let mut receiver = Receiver::new(TransferConfig::default());
        let received = receiver
            .receive(&link, 3, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(received, blob);
        assert_eq!(acks(&link), vec![1, 1, 3]);
    }

    #[tokio::test]
    async fn corrupted_and_stray_datagrams_get_no_ack() {
        let blob = vec![3u8; 600];
        let p = packets(&blob);
        let mut corrupted = p[1].clone();
        corrupted[100] ^= 0x80;
        let link = ScriptedLink::preloaded([
            p[0].clone(),
            corrupted,
            b"get!==!".to_vec(),
            p[1].clone(),
        ]);

        let mut receiver = Receiver::new(TransferConfig::default());
        let received = receiver
            .receive(&link, 2, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(received, blob);
        assert_eq!(acks(&link), vec![1, 2]);
        assert_eq!(receiver.report().discarded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn linger_reacknowledges_retransmitted_tail() {
        let blob = vec![8u8; 500];
        let p = packets(&blob);
        let link = ScriptedLink::preloaded([p[0].clone(), p[1].clone(), p[1].clone()]);
        let cancel = CancelToken::new();

        let mut receiver = Receiver::new(TransferConfig::default());
        receiver.receive(&link, 2, &cancel).await.unwrap();
        assert_eq!(receiver.linger(&link, &cancel).await.unwrap(), None);

        assert_eq!(acks(&link), vec![1, 2, 2]);
        assert_eq!(receiver.report().lingered_acks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn linger_hands_back_the_next_session_datagram() {
        let blob = vec![4u8; 500];
        let p = packets(&blob);
        let link = ScriptedLink::preloaded([
            p[0].clone(),
            p[1].clone(),
            p[1].clone(),
            b"get!==!".to_vec(),
            p[1].clone(),
        ]);
        let cancel = CancelToken::new();

        let mut receiver = Receiver::new(TransferConfig::default());
        receiver.receive(&link, 2, &cancel).await.unwrap();
        let next = receiver.linger(&link, &cancel).await.unwrap();

        assert_eq!(next.as_deref(), Some(&b"get!==!"[..]));
        assert_eq!(receiver.report().lingered_acks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn only_valid_retransmissions_extend_linger() {
        let blob = vec![6u8; 500];
        let p = packets(&blob);
        let mut corrupted = p[1].clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0x01;

        let link = ScriptedLink::preloaded([p[0].clone(), p[1].clone()]);
        let config = TransferConfig {
            linger_ms: 1_000,
            ..Default::default()
        };
        let cancel = CancelToken::new();
        let mut receiver = Receiver::new(config);
        receiver.receive(&link, 2, &cancel).await.unwrap();

        // A corrupted copy every 400 ms would keep a naive quiet timer alive
        // forever.
        let started = Instant::now();
        let feeder = async {
            for _ in 0..10 {
                time::sleep(std::time::Duration::from_millis(400)).await;
                link.inject(corrupted.clone());
            }
        };
        let lingering = async {
            let result = receiver.linger(&link, &cancel).await;
            (result, started.elapsed())
        };
        let ((lingered, elapsed), ()) = tokio::join!(lingering, feeder);

        assert_eq!(lingered.unwrap(), None);
        assert!(elapsed >= std::time::Duration::from_millis(1_000), "{elapsed:?}");
        assert!(elapsed < std::time::Duration::from_millis(1_200), "{elapsed:?}");
        assert_eq!(receiver.report().lingered_acks, 0);
        assert_eq!(receiver.report().discarded, 2);
    }

    #[tokio::test]
    async fn absurd_packet_count_is_refused_before_allocating() {
        let link = ScriptedLink::new(|_| Vec::new());
        let mut receiver = Receiver::new(TransferConfig::default());
        let result = receiver.receive(&link, u32::MAX, &CancelToken::new()).await;
        assert!(matches!(result, Err(TransferError::TooManyPackets(u32::MAX))));
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn empty_file_arrives_as_one_header_only_packet() {
        let link = ScriptedLink::preloaded(packets(b""));
        let mut receiver = Receiver::new(TransferConfig::default());
        let received = receiver
            .receive(&link, 1, &CancelToken::new())
            .await
            .unwrap();
        assert!(received.is_empty());
        assert_eq!(acks(&link), vec![1]);
    }
}
