//! Single-room TCP chat relay
//!
//! Clients join a shared room over a line-delimited text protocol, send
//! messages, and receive everyone else's messages plus join/leave notices.
//!
//! # Protocol
//! One message per line, fields separated by `|`:
//! - client → server: `JOIN|name`, `SEND|body`, `LEAVE`
//! - server → client: `OK`, `ERR|reason`, `MSG|name|body`, `JOINED|name`, `LEFT|name`
//!
//! # Architecture
//! - `ChatServer` accepts connections and owns the `Registry`
//! - each connection runs in its own task: JOIN handshake, then an inbound
//!   read loop on that task plus a spawned outbound write task
//! - broadcasts go through each `Session`'s bounded outbox; a full outbox
//!   drops the line instead of blocking the sender
//!
//! # Example
//! ```ignore
//! use chat_relay::ChatServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::listen("127.0.0.1:8080").await.unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     server.shutdown().await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::ChatClient;
pub use config::ServerConfig;
pub use error::{ClientError, DecodeError, JoinError, ServerError};
pub use handler::handle_connection;
pub use message::Message;
pub use registry::Registry;
pub use server::ChatServer;
pub use session::Session;
pub use types::ConnId;
