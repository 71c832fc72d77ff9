//! Chat client
//!
//! Connects to a relay, performs the JOIN handshake, then sends chat lines
//! and receives room traffic. Used by the `chat_client` binary.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::debug;

use crate::error::ClientError;
use crate::message::Message;

/// Time allowed to connect, and for the server to answer JOIN
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A joined client connection
#[derive(Debug)]
pub struct ChatClient {
    username: String,
    incoming: Incoming,
    outgoing: Outgoing,
}

/// Receiving half of a joined client
#[derive(Debug)]
pub struct Incoming {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
}

/// Sending half of a joined client
#[derive(Debug)]
pub struct Outgoing {
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl ChatClient {
    /// Connect to `addr` and join the room as `username`
    ///
    /// Fails with [`ClientError::Rejected`] if the server answers ERR.
    pub async fn connect(addr: &str, username: &str) -> Result<Self, ClientError> {
        let stream = timeout(CLIENT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, LinesCodec::new());
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        let join = Message::Join {
            name: username.to_string(),
        };
        writer.send(join.encode()).await?;

        let line = timeout(CLIENT_TIMEOUT, reader.next())
            .await
            .map_err(|_| ClientError::Timeout)?
            .ok_or(ClientError::Disconnected)??;

        match Message::decode(&line)? {
            Message::Ok => {
                debug!("Joined as {}", username);
                Ok(Self {
                    username: username.to_string(),
                    incoming: Incoming { reader },
                    outgoing: Outgoing { writer },
                })
            }
            Message::Err { reason } => Err(ClientError::Rejected(reason)),
            other => Err(ClientError::UnexpectedResponse(other.kind().to_string())),
        }
    }

    /// Name this client joined under
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Send a chat line to everyone else
    pub async fn send(&mut self, body: &str) -> Result<(), ClientError> {
        self.outgoing.send(body).await
    }

    /// Next message from the server; `None` once disconnected
    pub async fn recv(&mut self) -> Option<Message> {
        self.incoming.recv().await
    }

    /// Send LEAVE and close the connection
    pub async fn leave(mut self) -> Result<(), ClientError> {
        self.outgoing.leave().await
    }

    /// Split into halves that can be driven from separate tasks
    pub fn split(self) -> (Incoming, Outgoing) {
        (self.incoming, self.outgoing)
    }
}

impl Incoming {
    /// Next decodable message; undecodable lines are skipped
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.reader.next().await? {
                Ok(line) => match Message::decode(&line) {
                    Ok(msg) => return Some(msg),
                    Err(e) => debug!("Skipping server line {:?}: {}", line, e),
                },
                Err(e) => {
                    debug!("Read error: {}", e);
                    return None;
                }
            }
        }
    }
}

impl Outgoing {
    /// Send a chat line
    pub async fn send(&mut self, body: &str) -> Result<(), ClientError> {
        let msg = Message::Send {
            body: body.to_string(),
        };
        self.writer.send(msg.encode()).await?;
        Ok(())
    }

    /// Send LEAVE, then close the write side
    pub async fn leave(&mut self) -> Result<(), ClientError> {
        self.writer.send(Message::Leave.encode()).await?;
        SinkExt::<String>::close(&mut self.writer).await?;
        Ok(())
    }
}

/// A line typed at the interactive prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `send <message>`
    Send(String),
    /// `leave`
    Leave,
    /// Blank input
    Empty,
    /// Anything else
    Unknown,
}

impl Command {
    /// Parse one line of keyboard input
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if line == "leave" {
            return Command::Leave;
        }
        match line.strip_prefix("send ") {
            Some(body) if !body.trim().is_empty() => Command::Send(body.to_string()),
            _ => Command::Unknown,
        }
    }
}

/// Render a server message for the terminal, if it should be shown
pub fn render(msg: &Message) -> Option<String> {
    match msg {
        Message::Msg { name, body } => Some(format!("[{}]: {}", name, body)),
        Message::Joined { name } => Some(format!("* {} has joined the chat *", name)),
        Message::Left { name } => Some(format!("* {} has left the chat *", name)),
        Message::Err { reason } => Some(format!("Error: {}", reason)),
        _ => None,
    }
}
