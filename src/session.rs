//! Joined client session
//!
//! A `Session` is the shareable handle of one joined connection: its identity,
//! the sending side of its outbox, and the two tokens that end it. The
//! connection's socket halves are driven by two activities:
//! - [`Session::run_inbound`] decodes lines and broadcasts chat messages
//! - [`Session::run_outbound`] writes queued lines back to the peer

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::message::Message;
use crate::registry::Registry;

/// Receiving side of a session's outbox, owned by the outbound activity
pub type Outbox = mpsc::Receiver<String>;

/// Handle to one joined client
///
/// Cheap to clone: the registry keeps one copy, the connection task another.
#[derive(Debug, Clone)]
pub struct Session {
    /// Display name, unique within the registry
    identity: String,
    /// Server → Client line queue (bounded, never awaited on)
    outbox: mpsc::Sender<String>,
    /// Cancelled to force the transport closed
    closer: CancellationToken,
    /// Cancelled once the inbound activity has finished
    done: CancellationToken,
}

impl Session {
    /// Create a session handle and the outbox it feeds
    ///
    /// `closer` is normally a child of the server's shutdown token. A zero
    /// capacity is treated as one.
    pub fn new(identity: String, capacity: usize, closer: CancellationToken) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            identity,
            outbox: tx,
            closer,
            done: CancellationToken::new(),
        };
        (session, rx)
    }

    /// Display name this session joined under
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Enqueue a line for delivery to this client
    ///
    /// Never waits. When the outbox is full the line is dropped and logged, so
    /// one slow reader cannot stall a broadcast.
    pub fn send(&self, line: String) {
        match self.outbox.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("dropping message for slow client {}", self.identity);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("outbox closed for {}, message discarded", self.identity);
            }
        }
    }

    /// Force the transport closed
    ///
    /// Unblocks a pending inbound read and stops further writes. Repeated calls
    /// are no-ops.
    pub fn close(&self) {
        self.closer.cancel();
    }

    /// Whether the transport has been forced closed
    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Signal that the session is terminating
    ///
    /// The outbound activity drains what is already queued, then exits.
    pub fn terminate(&self) {
        self.done.cancel();
    }

    /// Inbound activity: read lines until LEAVE, EOF, a read error, or close
    ///
    /// Undecodable lines are skipped. `SEND` is rebroadcast to everyone else as
    /// `MSG`. This never touches registration; the caller owns teardown.
    pub async fn run_inbound<R>(&self, reader: &mut FramedRead<R, LinesCodec>, registry: &Registry)
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let next = tokio::select! {
                _ = self.closer.cancelled() => {
                    debug!("Transport closed under {}", self.identity);
                    break;
                }
                next = reader.next() => next,
            };

            let line = match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    debug!("Read error for {}: {}", self.identity, e);
                    break;
                }
                None => {
                    debug!("Client {} closed the connection", self.identity);
                    break;
                }
            };

            match Message::decode(&line) {
                Ok(Message::Send { body }) => {
                    let msg = Message::Msg {
                        name: self.identity.clone(),
                        body,
                    };
                    registry.broadcast_except(&self.identity, &msg.encode());
                }
                Ok(Message::Leave) => {
                    debug!("Client {} sent LEAVE", self.identity);
                    break;
                }
                Ok(other) => {
                    debug!("Ignoring {} from {}", other.kind(), self.identity);
                }
                Err(e) => {
                    debug!("Discarding line from {}: {}", self.identity, e);
                }
            }
        }
        debug!("Inbound activity ended for {}", self.identity);
    }

    /// Outbound activity: write queued lines in order until terminated
    ///
    /// A failed write ends the activity at once. After [`terminate`](Self::terminate)
    /// the remaining queue is drained; after [`close`](Self::close) nothing more
    /// is written.
    pub async fn run_outbound<W>(self, mut outbox: Outbox, mut writer: FramedWrite<W, LinesCodec>)
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                biased;
                _ = self.closer.cancelled() => {
                    debug!("Outbound activity for {} stopped by close", self.identity);
                    return;
                }
                line = outbox.recv() => {
                    let Some(line) = line else {
                        break;
                    };
                    if !self.write_line(&mut writer, line).await {
                        return;
                    }
                }
                _ = self.done.cancelled() => break,
            }
        }

        while let Ok(line) = outbox.try_recv() {
            if !self.write_line(&mut writer, line).await {
                return;
            }
        }
        debug!("Outbound activity drained for {}", self.identity);
    }

    /// Write one line; false if the peer is gone or the transport was closed
    async fn write_line<W>(&self, writer: &mut FramedWrite<W, LinesCodec>, line: String) -> bool
    where
        W: AsyncWrite + Unpin,
    {
        tokio::select! {
            _ = self.closer.cancelled() => false,
            result = writer.send(line) => match result {
                Ok(()) => true,
                Err(e) => {
                    debug!("Write to {} failed: {}", self.identity, e);
                    false
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn session(name: &str, capacity: usize) -> (Session, Outbox) {
        Session::new(name.to_string(), capacity, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_send_never_blocks_when_full() {
        let (client, mut outbox) = session("alice", 1);
        client.send("msg1".to_string());
        client.send("msg2".to_string());

        assert_eq!(outbox.try_recv().unwrap(), "msg1");
        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _outbox) = session("alice", 4);
        assert!(!client.is_closed());
        client.close();
        client.close();
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_outbound_preserves_order_and_drains() {
        let (client, outbox) = session("alice", 8);
        let (server_io, peer_io) = duplex(1024);
        let writer = FramedWrite::new(server_io, LinesCodec::new());

        for i in 0..3 {
            client.send(format!("line {}", i));
        }
        client.terminate();
        client.clone().run_outbound(outbox, writer).await;

        let mut lines = BufReader::new(peer_io).lines();
        for i in 0..3 {
            assert_eq!(lines.next_line().await.unwrap().unwrap(), format!("line {}", i));
        }
    }

    #[tokio::test]
    async fn test_outbound_stops_after_close() {
        let (client, outbox) = session("alice", 8);
        let (server_io, peer_io) = duplex(1024);
        let writer = FramedWrite::new(server_io, LinesCodec::new());

        client.send("never".to_string());
        client.close();
        client.terminate();
        client.clone().run_outbound(outbox, writer).await;

        // Writer dropped without writing: the peer sees EOF straight away.
        let mut lines = BufReader::new(peer_io).lines();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inbound_broadcasts_send_and_stops_on_leave() {
        let registry = Registry::new();
        let (alice, _alice_outbox) = session("alice", 8);
        let (bob, mut bob_outbox) = session("bob", 8);
        assert!(registry.try_register(alice.clone()));
        assert!(registry.try_register(bob));

        let (server_io, mut peer_io) = duplex(1024);
        peer_io
            .write_all(b"garbage\nSEND|hi\nJOIN|mallory\nLEAVE\nSEND|late\n")
            .await
            .unwrap();

        let mut reader = FramedRead::new(server_io, LinesCodec::new());
        alice.run_inbound(&mut reader, &registry).await;

        assert_eq!(bob_outbox.try_recv().unwrap(), "MSG|alice|hi");
        assert!(bob_outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inbound_ends_on_close() {
        let registry = Registry::new();
        let (alice, _outbox) = session("alice", 8);
        let (server_io, _peer_io) = duplex(64);
        let mut reader = FramedRead::new(server_io, LinesCodec::new());

        alice.close();
        alice.run_inbound(&mut reader, &registry).await;
    }
}
