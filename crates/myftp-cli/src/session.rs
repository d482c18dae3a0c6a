//! Session layer: connect, command exchange, and the file request handshake
//! that precedes every transfer.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use myftp_abstract::{
    Command, Datagram, FileRequest, PACKET_SIZE, RequestReply, TransferConfig,
};
use myftp_core::{CancelToken, Receiver, Segments, Sender, TransferError};

use crate::interrupt::Interrupts;
use crate::link::{ReplyingLink, UdpLink};
use crate::store::{FileStore, StoreError, check_name};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Transfer(TransferError::Cancelled))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Stored { path: PathBuf, bytes: usize },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Sent { name: String, bytes: usize },
    NotFound { name: String },
}

/// One UDP socket plus the files behind it. Both roles of the program are
/// built on this.
pub struct Peer<S> {
    socket: Arc<UdpSocket>,
    store: S,
    transfer: TransferConfig,
}

impl<S: FileStore> Peer<S> {
    pub fn new(socket: UdpSocket, store: S, transfer: TransferConfig) -> Self {
        Self {
            socket: Arc::new(socket),
            store,
            transfer,
        }
    }

    pub async fn bind(
        addr: impl ToSocketAddrs,
        store: S,
        transfer: TransferConfig,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(socket, store, transfer))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send_command(&self, to: SocketAddr, command: &Command) -> io::Result<()> {
        self.socket.send_to(&command.encode(), to).await?;
        Ok(())
    }

    /// Ask `peer` for `name` and store what arrives.
    ///
    /// The request is repeated every acknowledgment timeout until a reply
    /// comes back.
    pub async fn request_file(
        &self,
        peer: SocketAddr,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<Fetch, SessionError> {
        let (fetch, next) = self.fetch_file(peer, name, cancel).await?;
        if let Some(datagram) = next {
            debug!(len = datagram.len(), "ignoring datagram that ended the linger");
        }
        Ok(fetch)
    }

    /// [`Peer::request_file`], also returning the datagram that cut the
    /// receiver's linger short, if any.
    async fn fetch_file(
        &self,
        peer: SocketAddr,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<(Fetch, Option<Vec<u8>>), SessionError> {
        check_name(name)?;
        let request = FileRequest {
            name: name.to_string(),
            reply_port: self.socket.local_addr()?.port(),
        }
        .encode();
        let link = UdpLink::new(self.socket.clone(), peer);

        let total = match self.await_reply(&link, &request, cancel).await? {
            RequestReply::NotFound => {
                info!(name, %peer, "peer does not have the file");
                return Ok((Fetch::NotFound, None));
            }
            RequestReply::Accepted { total_packets } => total_packets,
        };
        info!(name, total_packets = total, "request accepted");

        let mut receiver = Receiver::new(self.transfer.clone());
        let blob = receiver.receive(&link, total, cancel).await?;
        let path = self.store.write(name, &blob).await?;
        info!(name, bytes = blob.len(), path = %path.display(), "file stored");

        let next = receiver.linger(&link, cancel).await.unwrap_or_else(|err| {
            debug!(%err, "linger cut short");
            None
        });
        let fetch = Fetch::Stored {
            path,
            bytes: blob.len(),
        };
        Ok((fetch, next))
    }

    async fn await_reply(
        &self,
        link: &UdpLink,
        request: &[u8],
        cancel: &CancelToken,
    ) -> Result<RequestReply, SessionError> {
        let mut buf = [0u8; PACKET_SIZE];
        loop {
            link.send(request).await?;
            let deadline = Instant::now() + self.transfer.ack_timeout();
            loop {
                let received = cancel
                    .guard(time::timeout_at(deadline, link.recv(&mut buf)))
                    .await?;
                let Ok(len) = received else {
                    debug!("no reply to file request, asking again");
                    break;
                };
                match RequestReply::decode(&buf[..len?]) {
                    Ok(reply) => return Ok(reply),
                    Err(err) => debug!(%err, "ignoring datagram while awaiting reply"),
                }
            }
        }
    }

    /// Wait for the peer's file request, then send the file.
    pub async fn serve_file_request(&self, cancel: &CancelToken) -> Result<Served, SessionError> {
        let mut buf = [0u8; PACKET_SIZE];
        loop {
            let (len, from) = cancel.guard(self.socket.recv_from(&mut buf)).await??;
            match FileRequest::decode(&buf[..len]) {
                Ok(request) => {
                    return self
                        .answer_file_request(request, from, &buf[..len], cancel)
                        .await;
                }
                Err(err) => debug!(%from, %err, "ignoring datagram while awaiting request"),
            }
        }
    }

    async fn answer_file_request(
        &self,
        request: FileRequest,
        from: SocketAddr,
        raw: &[u8],
        cancel: &CancelToken,
    ) -> Result<Served, SessionError> {
        let peer = SocketAddr::new(from.ip(), request.reply_port);
        let name = request.name;
        info!(name = %name, %peer, "file requested");
        let link = UdpLink::new(self.socket.clone(), peer);

        let blob = match self.store.read(&name).await {
            Ok(blob) => blob,
            Err(err @ (StoreError::NotFound(_) | StoreError::InvalidName(_))) => {
                warn!(%err, "rejecting file request");
                link.send(&RequestReply::NotFound.encode()).await?;
                return Ok(Served::NotFound { name });
            }
            Err(err) => return Err(err.into()),
        };

        let bytes = blob.len();
        let total_packets = Segments::new(blob.clone())?.total();
        let reply = RequestReply::Accepted { total_packets }.encode();
        link.send(&reply).await?;

        let link = ReplyingLink::new(link, raw.to_vec(), reply);
        let mut sender = Sender::new(self.transfer.clone());
        sender.send(&link, blob, cancel).await?;
        let report = sender.report();
        info!(
            name = %name,
            bytes,
            datagrams = report.datagrams_sent,
            retransmissions = report.retransmissions,
            "file sent"
        );
        Ok(Served::Sent { name, bytes })
    }

    /// Server role: accept a connection, then obey its commands until
    /// shutdown. A failed transfer is logged and the loop carries on.
    pub async fn serve(&self, interrupts: &Interrupts) -> Result<(), SessionError> {
        let mut client: Option<IpAddr> = None;
        let mut buf = [0u8; PACKET_SIZE];
        // A command that arrived while the last upload was lingering.
        let mut pending: Option<(Vec<u8>, SocketAddr)> = None;
        info!(addr = %self.local_addr()?, "server listening");
        loop {
            let (datagram, from) = match pending.take() {
                Some(next) => next,
                None => {
                    let Ok(received) = interrupts
                        .shutdown()
                        .guard(self.socket.recv_from(&mut buf))
                        .await
                    else {
                        info!("server shutting down");
                        return Ok(());
                    };
                    let (len, from) = received?;
                    (buf[..len].to_vec(), from)
                }
            };

            let command = match Command::decode(&datagram) {
                Ok(Command::Connect) => {
                    info!(%from, "connection established");
                    client = Some(from.ip());
                    continue;
                }
                _ if client != Some(from.ip()) => {
                    warn!(%from, "ignoring datagram from a host that has not connected");
                    continue;
                }
                Ok(command) => command,
                Err(err) => {
                    // Our reply to an earlier request was lost; answer it again.
                    if let Ok(request) = FileRequest::decode(&datagram) {
                        let scope = interrupts.begin_transfer();
                        log_outcome(
                            self.answer_file_request(request, from, &datagram, scope.token())
                                .await,
                        );
                    } else {
                        debug!(%from, %err, "ignoring unknown datagram");
                    }
                    continue;
                }
            };

            let scope = interrupts.begin_transfer();
            match command {
                Command::Get => log_outcome(self.serve_file_request(scope.token()).await),
                Command::Write { name } => {
                    match self.fetch_file(from, &name, scope.token()).await {
                        Ok((fetch, next)) => {
                            log_outcome(Ok(fetch));
                            // The client talks from one socket, so `from` is
                            // still the right source.
                            pending = next.map(|datagram| (datagram, from));
                        }
                        Err(err) => log_outcome::<Fetch>(Err(err)),
                    }
                }
                Command::Connect => {}
            }
        }
    }
}

fn log_outcome<T: std::fmt::Debug>(result: Result<T, SessionError>) {
    match result {
        Ok(outcome) => debug!(?outcome, "transfer finished"),
        Err(err) if err.is_cancelled() => info!("transfer cancelled"),
        Err(err) => warn!(%err, "transfer failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DirStore, scratch_dir};

    fn quick() -> TransferConfig {
        TransferConfig {
            ack_timeout_ms: 200,
            linger_ms: 50,
            ..Default::default()
        }
    }

    async fn peer(root: &std::path::Path, side: &str) -> Peer<DirStore> {
        let store = DirStore::new(root.join(side), root.join(format!("{side}-out")));
        Peer::bind("127.0.0.1:0", store, quick()).await.unwrap()
    }

    #[tokio::test]
    async fn file_travels_between_two_sockets() {
        let root = scratch_dir("session-ok");
        std::fs::create_dir_all(root.join("server")).unwrap();
        let contents: Vec<u8> = (0..5000).map(|i| (i % 256) as u8).collect();
        std::fs::write(root.join("server").join("data.bin"), &contents).unwrap();

        let server = peer(&root, "server").await;
        let client = peer(&root, "client").await;
        let server_addr = server.local_addr().unwrap();
        let cancel = CancelToken::new();

        let (served, fetched) = tokio::join!(
            server.serve_file_request(&cancel),
            client.request_file(server_addr, "data.bin", &cancel),
        );

        assert_eq!(
            served.unwrap(),
            Served::Sent {
                name: "data.bin".into(),
                bytes: 5000
            }
        );
        let Fetch::Stored { path, bytes } = fetched.unwrap() else {
            panic!("file was not stored");
        };
        assert_eq!(bytes, 5000);
        assert_eq!(std::fs::read(path).unwrap(), contents);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn get_right_after_put_reaches_a_lingering_server() {
        let root = scratch_dir("session-put-get");
        std::fs::create_dir_all(root.join("server")).unwrap();
        std::fs::create_dir_all(root.join("client")).unwrap();
        let upload: Vec<u8> = (0..3000).map(|i| (i % 253) as u8).collect();
        let download: Vec<u8> = (0..2000).map(|i| (i % 7) as u8).collect();
        std::fs::write(root.join("client").join("a.bin"), &upload).unwrap();
        std::fs::write(root.join("server").join("b.bin"), &download).unwrap();

        // Linger outlasts the request retry interval.
        let config = TransferConfig {
            ack_timeout_ms: 200,
            linger_ms: 1_000,
            ..Default::default()
        };
        let server = Peer::bind(
            "127.0.0.1:0",
            DirStore::new(root.join("server"), root.join("server-out")),
            config.clone(),
        )
        .await
        .unwrap();
        let client = Peer::bind(
            "127.0.0.1:0",
            DirStore::new(root.join("client"), root.join("client-out")),
            config,
        )
        .await
        .unwrap();
        let server_addr = server.local_addr().unwrap();
        let interrupts = Interrupts::new();

        let session = async {
            let cancel = CancelToken::new();
            client.send_command(server_addr, &Command::Connect).await.unwrap();
            client
                .send_command(server_addr, &Command::Write { name: "a.bin".into() })
                .await
                .unwrap();
            let put = client.serve_file_request(&cancel).await.unwrap();

            client.send_command(server_addr, &Command::Get).await.unwrap();
            let get = time::timeout(
                std::time::Duration::from_secs(5),
                client.request_file(server_addr, "b.bin", &cancel),
            )
            .await;
            interrupts.shutdown().cancel();
            (put, get)
        };
        let (served, (put, get)) = tokio::join!(server.serve(&interrupts), session);

        served.unwrap();
        assert_eq!(
            put,
            Served::Sent {
                name: "a.bin".into(),
                bytes: 3000
            }
        );
        let Fetch::Stored { path, bytes } = get.expect("get timed out").unwrap() else {
            panic!("download was not stored");
        };
        assert_eq!(bytes, 2000);
        assert_eq!(std::fs::read(path).unwrap(), download);
        assert_eq!(
            std::fs::read(root.join("server-out").join("a.bin")).unwrap(),
            upload
        );
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_file_is_reported_not_found() {
        let root = scratch_dir("session-fnf");
        let server = peer(&root, "server").await;
        let client = peer(&root, "client").await;
        let server_addr = server.local_addr().unwrap();
        let cancel = CancelToken::new();

        let (served, fetched) = tokio::join!(
            server.serve_file_request(&cancel),
            client.request_file(server_addr, "nope.txt", &cancel),
        );

        assert_eq!(
            served.unwrap(),
            Served::NotFound {
                name: "nope.txt".into()
            }
        );
        assert_eq!(fetched.unwrap(), Fetch::NotFound);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn unsafe_names_are_refused_before_asking() {
        let root = scratch_dir("session-name");
        let client = peer(&root, "client").await;
        let nowhere: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let result = client
            .request_file(nowhere, "../secret", &CancelToken::new())
            .await;
        assert!(matches!(
            result,
            Err(SessionError::Store(StoreError::InvalidName(_)))
        ));
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn oversized_packet_count_is_refused() {
        let root = scratch_dir("session-huge");
        let client = peer(&root, "client").await;
        let rogue = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let rogue_addr = rogue.local_addr().unwrap();
        let answering = async {
            let mut buf = [0u8; 64];
            let (_, from) = rogue.recv_from(&mut buf).await.unwrap();
            rogue.send_to(b"4294967295", from).await.unwrap();
        };

        let cancel = CancelToken::new();
        let (result, ()) = tokio::join!(
            client.request_file(rogue_addr, "a.txt", &cancel),
            answering,
        );
        assert!(matches!(
            result,
            Err(SessionError::Transfer(TransferError::TooManyPackets(u32::MAX)))
        ));
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn unanswered_request_can_be_cancelled() {
        let root = scratch_dir("session-cancel");
        let client = peer(&root, "client").await;
        // A bound socket that never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(std::time::Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result = client
            .request_file(silent.local_addr().unwrap(), "a.txt", &cancel)
            .await;
        assert!(result.unwrap_err().is_cancelled());
        let _ = std::fs::remove_dir_all(root);
    }
}
