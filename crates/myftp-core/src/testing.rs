//! In-process link used by the engine unit tests.

use std::io;
use std::sync::Mutex;

use myftp_abstract::Datagram;
use myftp_abstract::packet::peek_seq;
use tokio::sync::mpsc;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// Records everything sent and answers each datagram through a responder
/// closure. Datagrams can also be queued up front.
pub struct ScriptedLink {
    sent: Mutex<Vec<Vec<u8>>>,
    responder: Mutex<Responder>,
    inbox_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ScriptedLink {
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(responder)),
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
        }
    }

    /// A link that never answers, pre-loaded with `datagrams`.
    pub fn preloaded(datagrams: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let link = Self::new(|_| Vec::new());
        for datagram in datagrams {
            link.inject(datagram);
        }
        link
    }

    /// Queue a datagram as if the peer had just sent it.
    pub fn inject(&self, datagram: Vec<u8>) {
        self.inbox_tx.send(datagram).unwrap();
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_seqs(&self) -> Vec<u32> {
        self.sent().iter().filter_map(|d| peek_seq(d)).collect()
    }
}

impl Datagram for ScriptedLink {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let replies = {
            let mut responder = self.responder.lock().unwrap();
            (*responder)(datagram)
        };
        self.sent.lock().unwrap().push(datagram.to_vec());
        for reply in replies {
            self.inbox_tx.send(reply).unwrap();
        }
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.inbox_rx.lock().await;
        match inbox.recv().await {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            None => std::future::pending().await,
        }
    }
}
