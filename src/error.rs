//! Error types for the chat relay
//!
//! Defines codec, server and client errors.
//! Uses thiserror for ergonomic error definitions.

use std::io;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Wire decoding errors
///
/// The codec never distinguishes failure reasons further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Empty line, unknown type token, or missing/empty field
    #[error("invalid message format")]
    InvalidMessage,
}

/// Supervisor-level errors
///
/// Per-connection failures never show up here; they only end that connection.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// IO error on the listener itself
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Chat client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket error (connect, read or write)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Line framing error (over-long line or IO underneath)
    #[error("line error: {0}")]
    Line(#[from] LinesCodecError),

    /// Server did not answer the join in time
    #[error("timed out waiting for the server")]
    Timeout,

    /// Server answered with something undecodable
    #[error("decoding server response: {0}")]
    Decode(#[from] DecodeError),

    /// Server refused the join
    #[error("server rejected join: {0}")]
    Rejected(String),

    /// Server answered the join with neither OK nor ERR
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Server closed the connection
    #[error("disconnected from server")]
    Disconnected,
}

/// Reasons a connection is refused entry to the room
///
/// The display text is sent verbatim to the peer in an `ERR` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    /// First line missing, unreadable, undecodable, or not a JOIN
    #[error("expected JOIN message")]
    ExpectedJoin,

    /// JOIN carried an empty name
    #[error("username cannot be empty")]
    EmptyUsername,

    /// Another session already holds the name
    #[error("username taken")]
    UsernameTaken,
}
