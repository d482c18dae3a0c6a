use std::future::Future;
use std::io;

/// A point-to-point datagram channel to one peer.
///
/// Each call moves exactly one whole datagram; implementations never split or
/// merge writes. Delivery, ordering and integrity are not guaranteed.
pub trait Datagram {
    /// Send one datagram to the peer.
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait for the next datagram from the peer, returning its length.
    ///
    /// Bytes beyond `buf.len()` are discarded.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}
