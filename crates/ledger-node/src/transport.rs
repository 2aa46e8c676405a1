//! Message transport
//!
//! Consensus only needs two operations from the network: broadcast a
//! message to every peer, and answer one peer (or everyone) with a
//! response. `LoopbackTransport` provides both for nodes living in one
//! process, passing encoded frames over a `tokio::sync::broadcast` channel
//! so every message crosses the wire codec.

use crate::error::{NodeError, Result};
use async_trait::async_trait;
use ledger_consensus::{Message, WireDimensions};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Transport-local peer address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// A decoded message and the peer it came from
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Sender
    pub from: PeerId,
    /// Payload
    pub message: Message,
}

/// Network seam between a node and its peers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address of this endpoint
    fn local_peer(&self) -> PeerId;

    /// Send `message` to every peer
    async fn broadcast(&self, message: Message) -> Result<()>;

    /// Send `message` to `peer`, or to every peer when `None`
    async fn enqueue_response(&self, peer: Option<PeerId>, message: Message) -> Result<()>;

    /// Next message addressed to this endpoint; `None` once the network is
    /// gone
    async fn receive(&self) -> Option<Envelope>;
}

#[derive(Debug, Clone)]
struct Frame {
    from: PeerId,
    to: Option<PeerId>,
    bytes: Arc<[u8]>,
}

/// In-process network joining loopback endpoints
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    sender: broadcast::Sender<Frame>,
    next_peer: Arc<AtomicU32>,
    dims: WireDimensions,
}

impl LoopbackNetwork {
    /// Network buffering up to `capacity` frames per endpoint
    pub fn new(dims: WireDimensions, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_peer: Arc::new(AtomicU32::new(0)),
            dims,
        }
    }

    /// New endpoint on this network
    pub fn join(&self) -> LoopbackTransport {
        let peer = PeerId(self.next_peer.fetch_add(1, Ordering::Relaxed));
        LoopbackTransport {
            peer,
            sender: self.sender.clone(),
            receiver: Mutex::new(self.sender.subscribe()),
            dims: self.dims,
        }
    }
}

/// One endpoint of a `LoopbackNetwork`
#[derive(Debug)]
pub struct LoopbackTransport {
    peer: PeerId,
    sender: broadcast::Sender<Frame>,
    receiver: Mutex<broadcast::Receiver<Frame>>,
    dims: WireDimensions,
}

impl LoopbackTransport {
    fn send(&self, to: Option<PeerId>, message: &Message) -> Result<()> {
        let frame = Frame {
            from: self.peer,
            to,
            bytes: message.encode().into(),
        };
        self.sender
            .send(frame)
            .map(|_| ())
            .map_err(|_| NodeError::transport("loopback network has no endpoints"))
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn local_peer(&self) -> PeerId {
        self.peer
    }

    async fn broadcast(&self, message: Message) -> Result<()> {
        self.send(None, &message)
    }

    async fn enqueue_response(&self, peer: Option<PeerId>, message: Message) -> Result<()> {
        self.send(peer, &message)
    }

    async fn receive(&self) -> Option<Envelope> {
        let mut receiver = self.receiver.lock().await;
        loop {
            let frame = match receiver.recv().await {
                Ok(frame) => frame,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(peer = %self.peer, skipped, "Loopback receiver lagged, frames lost");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            if frame.from == self.peer || frame.to.is_some_and(|to| to != self.peer) {
                continue;
            }
            match Message::decode(&frame.bytes, &self.dims) {
                Ok(message) => {
                    return Some(Envelope {
                        from: frame.from,
                        message,
                    })
                }
                Err(error) => tracing::debug!(from = %frame.from, %error, "Malformed frame dropped"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_consensus::RequestTickData;
    use std::time::Duration;

    fn request(tick: u32) -> Message {
        Message::RequestTickData(RequestTickData { tick })
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let network = LoopbackNetwork::new(WireDimensions::default(), 16);
        let a = network.join();
        let b = network.join();
        a.broadcast(request(5)).await.unwrap();

        let envelope = b.receive().await.unwrap();
        assert_eq!(envelope.from, a.local_peer());
        assert_eq!(envelope.message, request(5));
        assert!(tokio::time::timeout(Duration::from_millis(20), a.receive()).await.is_err());
    }

    #[tokio::test]
    async fn test_directed_response_reaches_only_its_peer() {
        let network = LoopbackNetwork::new(WireDimensions::default(), 16);
        let a = network.join();
        let b = network.join();
        let c = network.join();
        a.enqueue_response(Some(c.local_peer()), request(9)).await.unwrap();
        a.broadcast(request(10)).await.unwrap();

        assert_eq!(b.receive().await.unwrap().message, request(10));
        assert_eq!(c.receive().await.unwrap().message, request(9));
        assert_eq!(c.receive().await.unwrap().message, request(10));
    }
}
