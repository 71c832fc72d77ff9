//! TCP connection handler
//!
//! Drives one accepted connection from accept to close: the JOIN handshake,
//! registration, the session's inbound/outbound activities, and teardown.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{DecodeError, JoinError};
use crate::message::Message;
use crate::registry::Registry;
use crate::session::Session;

/// Handle a new TCP connection
///
/// `closer` is this connection's transport-close token; cancelling it (directly
/// or through its parent) unblocks any pending read and ends the connection.
/// Failures never escape: they are logged and close this connection only.
pub async fn handle_connection(
    stream: TcpStream,
    registry: Registry,
    config: Arc<ServerConfig>,
    closer: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    serve(read_half, write_half, registry, config, closer).await
}

/// Connection state machine over any pair of byte streams
async fn serve<R, W>(
    read_half: R,
    write_half: W,
    registry: Registry,
    config: Arc<ServerConfig>,
    closer: CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(config.max_line_length),
    );
    let mut writer = FramedWrite::new(write_half, LinesCodec::new());

    // Accepted: exactly one line, bounded by the handshake timeout
    let first = tokio::select! {
        _ = closer.cancelled() => {
            debug!("Connection closed during handshake");
            return;
        }
        first = timeout(config.handshake_timeout, reader.next()) => first,
    };
    let decoded = match first {
        Ok(Some(Ok(line))) => Message::decode(&line),
        Ok(Some(Err(e))) => {
            debug!("Handshake read failed: {}", e);
            Err(DecodeError::InvalidMessage)
        }
        Ok(None) => {
            debug!("Connection closed before JOIN");
            Err(DecodeError::InvalidMessage)
        }
        Err(_) => {
            debug!("Timed out waiting for JOIN");
            Err(DecodeError::InvalidMessage)
        }
    };

    let identity = match admit(decoded) {
        Ok(identity) => identity,
        Err(e) => return reject(&mut writer, e).await,
    };

    let (session, outbox) = Session::new(identity.clone(), config.outbox_capacity, closer.clone());
    if !registry.try_register(session.clone()) {
        return reject(&mut writer, JoinError::UsernameTaken).await;
    }

    // Joined. A failed OK is a transport error: nobody has heard of us yet,
    // so release the name without announcing anything.
    let ok_sent = tokio::select! {
        _ = closer.cancelled() => false,
        result = writer.send(Message::Ok.encode()) => match result {
            Ok(()) => true,
            Err(e) => {
                debug!("Failed to send OK to {}: {}", identity, e);
                false
            }
        },
    };
    if !ok_sent {
        registry.deregister(&identity);
        return;
    }

    info!("Client {} joined", identity);
    registry.broadcast_except(
        &identity,
        &Message::Joined {
            name: identity.clone(),
        }
        .encode(),
    );

    let mut outbound = tokio::spawn(session.clone().run_outbound(outbox, writer));
    session.run_inbound(&mut reader, &registry).await;

    // Terminating: release the name first so a stuck drain cannot hold it
    session.terminate();
    if registry.deregister(&identity) {
        info!("Client {} left", identity);
        registry.broadcast_except(
            &identity,
            &Message::Left {
                name: identity.clone(),
            }
            .encode(),
        );
    }

    let finished = match timeout(config.drain_timeout, &mut outbound).await {
        Ok(finished) => finished,
        Err(_) => {
            debug!("Outbox drain for {} timed out, closing", identity);
            session.close();
            outbound.await
        }
    };
    if let Err(e) = finished {
        warn!("Outbound task for {} failed: {}", identity, e);
    }
}

/// Check the handshake line; returns the identity to register
fn admit(first: Result<Message, DecodeError>) -> Result<String, JoinError> {
    match first {
        Ok(Message::Join { name }) if name.is_empty() => Err(JoinError::EmptyUsername),
        Ok(Message::Join { name }) => Ok(name),
        _ => Err(JoinError::ExpectedJoin),
    }
}

/// Send the ERR line for a refused join; the caller then drops the transport
async fn reject<W>(writer: &mut FramedWrite<W, LinesCodec>, err: JoinError)
where
    W: AsyncWrite + Unpin,
{
    debug!("Rejecting connection: {}", err);
    if let Err(e) = writer.send(Message::from(err).encode()).await {
        debug!("Failed to send rejection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{duplex, AsyncWriteExt};
    use tokio::time::sleep;

    use crate::session::Outbox;

    const WAIT: Duration = Duration::from_secs(2);

    fn member(registry: &Registry, name: &str) -> Outbox {
        let (session, outbox) = Session::new(name.to_string(), 64, CancellationToken::new());
        assert!(registry.try_register(session));
        outbox
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        timeout(WAIT, async {
            while !cond() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[test]
    fn test_admit_join() {
        let msg = Message::Join {
            name: "alice".to_string(),
        };
        assert_eq!(admit(Ok(msg)), Ok("alice".to_string()));
    }

    #[test]
    fn test_admit_rejects_other_first_messages() {
        let send = Message::Send {
            body: "x".to_string(),
        };
        assert_eq!(admit(Ok(send)), Err(JoinError::ExpectedJoin));
        assert_eq!(admit(Ok(Message::Leave)), Err(JoinError::ExpectedJoin));
        assert_eq!(
            admit(Err(DecodeError::InvalidMessage)),
            Err(JoinError::ExpectedJoin)
        );
    }

    #[test]
    fn test_admit_rejects_empty_name() {
        let msg = Message::Join {
            name: String::new(),
        };
        assert_eq!(admit(Ok(msg)), Err(JoinError::EmptyUsername));
    }

    #[tokio::test]
    async fn test_failed_ok_releases_name_silently() {
        let registry = Registry::new();
        let mut alice = member(&registry, "alice");

        let (read_half, mut peer_in) = duplex(256);
        let (write_half, peer_out) = duplex(256);
        drop(peer_out);
        peer_in.write_all(b"JOIN|bob\n").await.unwrap();

        let config = Arc::new(ServerConfig::default());
        timeout(
            WAIT,
            serve(read_half, write_half, registry.clone(), config, CancellationToken::new()),
        )
        .await
        .expect("connection did not end after failed OK");

        assert!(!registry.contains("bob"));
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_with_backlog_releases_name_before_drain() {
        let registry = Registry::new();
        let mut alice = member(&registry, "alice");

        let (read_half, mut peer_in) = duplex(1024);
        // Tiny pipe that nobody reads: the outbound side blocks once it fills.
        let (write_half, peer_out) = duplex(64);
        peer_in.write_all(b"JOIN|slow\n").await.unwrap();

        let config = Arc::new(ServerConfig::default());
        let conn = tokio::spawn(serve(
            read_half,
            write_half,
            registry.clone(),
            config,
            CancellationToken::new(),
        ));

        wait_until(|| registry.contains("slow")).await;
        for i in 0..32 {
            registry.broadcast_except("alice", &format!("MSG|alice|{}{}", i, "x".repeat(100)));
        }
        peer_in.write_all(b"LEAVE\n").await.unwrap();

        wait_until(|| !registry.contains("slow")).await;
        assert_eq!(alice.recv().await.unwrap(), "JOINED|slow");
        assert_eq!(alice.recv().await.unwrap(), "LEFT|slow");
        assert!(!conn.is_finished());

        // Peer goes away: the blocked write fails and the connection ends.
        drop(peer_out);
        timeout(WAIT, conn).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stuck_drain_is_cut_off() {
        let registry = Registry::new();
        let _alice = member(&registry, "alice");

        let (read_half, mut peer_in) = duplex(1024);
        let (write_half, _peer_out) = duplex(64);
        peer_in.write_all(b"JOIN|slow\n").await.unwrap();

        let config = Arc::new(ServerConfig {
            drain_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        });
        let conn = tokio::spawn(serve(
            read_half,
            write_half,
            registry.clone(),
            config,
            CancellationToken::new(),
        ));

        wait_until(|| registry.contains("slow")).await;
        for _ in 0..32 {
            registry.broadcast_except("alice", &"MSG|alice|".repeat(20));
        }
        peer_in.write_all(b"LEAVE\n").await.unwrap();

        timeout(WAIT, conn)
            .await
            .expect("drain was not bounded")
            .unwrap();
        assert!(!registry.contains("slow"));
    }
}
