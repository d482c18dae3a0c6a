//! In-memory impaired datagram link between a sender and a receiver engine.
//!
//! Every datagram passes through the same pipeline, in order: deterministic
//! one-shot drops, random loss, random corruption, random latency. Latency is
//! drawn per datagram, so packets can overtake each other.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tracing::debug;

use myftp_abstract::packet::peek_seq;
use myftp_abstract::{Ack, Datagram, SimConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

/// A compact textual summary of one link decision.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkCounters {
    pub sender_datagrams: u32,
    pub receiver_datagrams: u32,
    pub dropped: u32,
    pub corrupted: u32,
}

enum Fate {
    Drop,
    Deliver { datagram: Vec<u8>, latency: u64 },
}

struct LinkState {
    config: SimConfig,
    rng: StdRng,
    started: Instant,
    // Deterministic fault injection: drop first packet from Sender with given seq numbers
    drop_sender_seq_once: Vec<u32>,
    // Deterministic fault injection: drop first ACK from Receiver with given ack numbers
    drop_receiver_ack_once: Vec<u32>,
    counters: LinkCounters,
    events: Vec<LinkEventSummary>,
}

fn describe(from: NodeId, datagram: &[u8]) -> String {
    match from {
        NodeId::Sender => match peek_seq(datagram) {
            Some(seq) => format!("seq={seq} ({} bytes)", datagram.len()),
            None => format!("{} bytes", datagram.len()),
        },
        NodeId::Receiver => match Ack::decode(datagram) {
            Ok(Ack(ack)) => format!("ack={ack}"),
            Err(_) => format!("{} bytes", datagram.len()),
        },
    }
}

impl LinkState {
    fn record(&mut self, description: String) {
        let time = self.started.elapsed().as_millis() as u64;
        self.events.push(LinkEventSummary { time, description });
    }

    fn route(&mut self, from: NodeId, datagram: &[u8]) -> Fate {
        let to = from.peer();
        let label = describe(from, datagram);
        match from {
            NodeId::Sender => self.counters.sender_datagrams += 1,
            NodeId::Receiver => self.counters.receiver_datagrams += 1,
        }

        if from == NodeId::Sender
            && let Some(seq) = peek_seq(datagram)
            && let Some(pos) = self.drop_sender_seq_once.iter().position(|s| *s == seq)
        {
            self.drop_sender_seq_once.remove(pos);
            self.counters.dropped += 1;
            debug!(seq, "deterministically dropping sender packet");
            self.record(format!("[{from:?}->{to:?}] DROP (deterministic seq) {label}"));
            return Fate::Drop;
        }

        if from == NodeId::Receiver
            && let Ok(Ack(ack)) = Ack::decode(datagram)
            && let Some(pos) = self.drop_receiver_ack_once.iter().position(|a| *a == ack)
        {
            self.drop_receiver_ack_once.remove(pos);
            self.counters.dropped += 1;
            debug!(ack, "deterministically dropping receiver ack");
            self.record(format!("[{from:?}->{to:?}] DROP (deterministic ack) {label}"));
            return Fate::Drop;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.counters.dropped += 1;
            debug!(%label, "datagram lost in channel");
            self.record(format!("[{from:?}->{to:?}] DROP (random loss) {label}"));
            return Fate::Drop;
        }

        // 2. Check Corruption
        let mut datagram = datagram.to_vec();
        if self.rng.random::<f64>() < self.config.corrupt_rate {
            corrupt(from, &mut datagram);
            self.counters.corrupted += 1;
            debug!(%label, "datagram corrupted in channel");
            self.record(format!("[{from:?}->{to:?}] CORRUPT {label}"));
        }

        // 3. Calculate Latency
        let latency = if self.config.max_latency > self.config.min_latency {
            self.rng
                .random_range(self.config.min_latency..=self.config.max_latency)
        } else {
            self.config.min_latency
        };
        self.record(format!(
            "[{from:?}->{to:?}] SEND {label} (latency={latency}ms)"
        ));
        Fate::Deliver { datagram, latency }
    }
}

/// Data packets get a flipped trailing byte, which always lands in the
/// digest-covered payload or in the digest itself. Acknowledgments carry no
/// checksum, so their leading byte is mangled to make the token unparseable
/// rather than silently changing its value.
fn corrupt(from: NodeId, datagram: &mut [u8]) {
    let target = match from {
        NodeId::Sender => datagram.last_mut(),
        NodeId::Receiver => datagram.first_mut(),
    };
    if let Some(byte) = target {
        *byte ^= 0xFF;
    }
}

/// Shared handle on the link: fault registration and inspection.
#[derive(Clone)]
pub struct SimLink {
    state: Arc<Mutex<LinkState>>,
}

impl SimLink {
    /// Build a link and its two endpoints.
    pub fn pair(config: SimConfig) -> (SimLink, SimEndpoint, SimEndpoint) {
        let state = Arc::new(Mutex::new(LinkState {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            started: Instant::now(),
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            counters: LinkCounters::default(),
            events: Vec::new(),
        }));
        let (to_receiver, receiver_inbox) = mpsc::unbounded_channel();
        let (to_sender, sender_inbox) = mpsc::unbounded_channel();

        let sender = SimEndpoint {
            node: NodeId::Sender,
            state: state.clone(),
            outbound: to_receiver,
            inbox: tokio::sync::Mutex::new(sender_inbox),
        };
        let receiver = SimEndpoint {
            node: NodeId::Receiver,
            state: state.clone(),
            outbound: to_sender,
            inbox: tokio::sync::Mutex::new(receiver_inbox),
        };
        (SimLink { state }, sender, receiver)
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a deterministic fault: drop the first packet sent by Sender whose seq equals `seq`.
    pub fn add_drop_sender_seq_once(&self, seq: u32) {
        self.lock().drop_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_drop_receiver_ack_once(&self, ack: u32) {
        self.lock().drop_receiver_ack_once.push(ack);
    }

    pub fn counters(&self) -> LinkCounters {
        self.lock().counters.clone()
    }

    pub fn events(&self) -> Vec<LinkEventSummary> {
        self.lock().events.clone()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.lock().started.elapsed().as_millis() as u64
    }
}

/// One side of a [`SimLink`].
pub struct SimEndpoint {
    node: NodeId,
    state: Arc<Mutex<LinkState>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Datagram for SimEndpoint {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let fate = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .route(self.node, datagram);

        if let Fate::Deliver { datagram, latency } = fate {
            let outbound = self.outbound.clone();
            if latency == 0 {
                let _ = outbound.send(datagram);
            } else {
                tokio::spawn(async move {
                    time::sleep(Duration::from_millis(latency)).await;
                    // The peer may already be gone; the datagram is then lost.
                    let _ = outbound.send(datagram);
                });
            }
        }
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer endpoint dropped",
            )),
        }
    }
}
