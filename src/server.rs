//! ChatServer supervisor
//!
//! Owns the listener, the room registry and every connection task. Each
//! accepted connection runs [`handle_connection`] in its own task; shutdown
//! stops the accept loop, force-closes every session, and waits for all
//! connection tasks to finish.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::handle_connection;
use crate::registry::Registry;
use crate::types::ConnId;

/// A running chat relay
///
/// Created by [`ChatServer::listen`]; the accept loop runs in the background
/// until [`ChatServer::shutdown`].
#[derive(Debug)]
pub struct ChatServer {
    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,
    /// Joined sessions
    registry: Registry,
    /// Parent of every connection's close token
    shutdown: CancellationToken,
    /// Accept loop plus one task per accepted connection
    tracker: TaskTracker,
}

impl ChatServer {
    /// Bind `addr` with default settings and start accepting connections
    pub async fn listen(addr: &str) -> Result<Self, ServerError> {
        Self::listen_with_config(addr, ServerConfig::default()).await
    }

    /// Bind `addr` and start accepting connections
    pub async fn listen_with_config(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Chat relay listening on {}", local_addr);

        let server = Self {
            local_addr,
            registry: Registry::new(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };

        server.tracker.spawn(accept_loop(
            listener,
            server.registry.clone(),
            Arc::new(config),
            server.shutdown.clone(),
            server.tracker.clone(),
        ));

        Ok(server)
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The room's registry of joined sessions
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Stop accepting, close every session, and wait for all connections to end
    pub async fn shutdown(&self) {
        info!("Chat relay shutting down");
        self.shutdown.cancel();
        self.registry.close_all();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Chat relay stopped");
    }
}

/// Accept connections until shutdown
///
/// Accept errors are logged and the loop keeps going.
async fn accept_loop(
    listener: TcpListener,
    registry: Registry,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Shutdown signal received, stopping accept loop");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let conn_id = ConnId::next();
                debug!("New connection {} from {}", conn_id, peer);
                let span = info_span!("conn", id = %conn_id, %peer);
                tracker.spawn(
                    handle_connection(
                        stream,
                        registry.clone(),
                        Arc::clone(&config),
                        shutdown.child_token(),
                    )
                    .instrument(span),
                );
            }
            Err(e) => {
                warn!("accept error: {}", e);
            }
        }
    }
}
