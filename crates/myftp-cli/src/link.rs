use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use myftp_abstract::{Datagram, PACKET_SIZE};

/// A shared UDP socket pointed at one peer.
///
/// Datagrams from any other host are skipped. Only the IP is compared: the
/// peer acknowledges from its bound socket, whose port need not match the
/// port we send to.
#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpLink {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

impl Datagram for UdpLink {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let written = self.socket.send_to(datagram, self.peer).await?;
        if written != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {written} of {} bytes", datagram.len()),
            ));
        }
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (len, from) = self.socket.recv_from(buf).await?;
            if from.ip() == self.peer.ip() {
                trace!(%from, len, "datagram");
                return Ok(len);
            }
            debug!(%from, expected = %self.peer, "ignoring datagram from another host");
        }
    }
}

/// Serving side of a transfer: a repeated file request means our reply was
/// lost, so it is answered again instead of being handed to the sender.
pub struct ReplyingLink {
    inner: UdpLink,
    request: Vec<u8>,
    reply: Vec<u8>,
}

impl ReplyingLink {
    pub fn new(inner: UdpLink, request: Vec<u8>, reply: Vec<u8>) -> Self {
        Self {
            inner,
            request,
            reply,
        }
    }
}

impl Datagram for ReplyingLink {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        self.inner.send(datagram).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // Full-size scratch space: `buf` may be too short to tell a request apart.
        let mut scratch = [0u8; PACKET_SIZE];
        loop {
            let len = self.inner.recv(&mut scratch).await?;
            if scratch[..len] != self.request[..] {
                let copied = len.min(buf.len());
                buf[..copied].copy_from_slice(&scratch[..copied]);
                return Ok(copied);
            }
            debug!("repeated file request, resending reply");
            self.inner.send(&self.reply).await?;
        }
    }
}
