//! Message protocol definitions
//!
//! Line-based text protocol: one message per line, fields separated by `|`.
//! The type token is split off at the first `|` only, so bodies may carry
//! further separators.

use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, JoinError};

/// Field separator on the wire
pub const SEPARATOR: char = '|';

/// A single protocol message, in either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client → Server: request to enter the room under `name`
    Join { name: String },
    /// Client → Server: chat line for everyone else
    Send { body: String },
    /// Client → Server: leave the room
    Leave,
    /// Server → Client: join accepted
    Ok,
    /// Server → Client: request rejected
    Err { reason: String },
    /// Server → Client: chat line from another member
    Msg { name: String, body: String },
    /// Server → Client: someone entered the room
    Joined { name: String },
    /// Server → Client: someone left the room
    Left { name: String },
}

impl Message {
    /// Wire token naming this message's type
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join { .. } => "JOIN",
            Message::Send { .. } => "SEND",
            Message::Leave => "LEAVE",
            Message::Ok => "OK",
            Message::Err { .. } => "ERR",
            Message::Msg { .. } => "MSG",
            Message::Joined { .. } => "JOINED",
            Message::Left { .. } => "LEFT",
        }
    }

    /// Encode into a single wire line, without the trailing newline
    pub fn encode(&self) -> String {
        match self {
            Message::Leave | Message::Ok => self.kind().to_string(),
            Message::Join { name } | Message::Joined { name } | Message::Left { name } => {
                format!("{}{}{}", self.kind(), SEPARATOR, name)
            }
            Message::Send { body } => format!("{}{}{}", self.kind(), SEPARATOR, body),
            Message::Err { reason } => format!("{}{}{}", self.kind(), SEPARATOR, reason),
            Message::Msg { name, body } => {
                format!("{}{}{}{}{}", self.kind(), SEPARATOR, name, SEPARATOR, body)
            }
        }
    }

    /// Decode a single wire line (without the trailing newline)
    ///
    /// Every failure collapses into [`DecodeError::InvalidMessage`].
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        if line.is_empty() {
            return Err(DecodeError::InvalidMessage);
        }

        let (kind, rest) = match line.split_once(SEPARATOR) {
            Some((kind, rest)) => (kind, Some(rest)),
            None => (line, None),
        };

        match kind {
            "JOIN" => Ok(Message::Join {
                name: required(rest)?,
            }),
            "SEND" => Ok(Message::Send {
                body: required(rest)?,
            }),
            "LEAVE" => Ok(Message::Leave),
            "OK" => Ok(Message::Ok),
            "ERR" => Ok(Message::Err {
                reason: required(rest)?,
            }),
            "MSG" => {
                let (name, body) = rest
                    .and_then(|rest| rest.split_once(SEPARATOR))
                    .ok_or(DecodeError::InvalidMessage)?;
                Ok(Message::Msg {
                    name: required(Some(name))?,
                    body: required(Some(body))?,
                })
            }
            "JOINED" => Ok(Message::Joined {
                name: required(rest)?,
            }),
            "LEFT" => Ok(Message::Left {
                name: required(rest)?,
            }),
            _ => Err(DecodeError::InvalidMessage),
        }
    }
}

/// A field that must be present and non-empty
fn required(field: Option<&str>) -> Result<String, DecodeError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(DecodeError::InvalidMessage),
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Message {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, DecodeError> {
        Message::decode(s)
    }
}

/// Convert a join refusal into the ERR line sent before closing
impl From<JoinError> for Message {
    fn from(err: JoinError) -> Self {
        Message::Err {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Message> {
        vec![
            Message::Join { name: "alice".into() },
            Message::Send { body: "hello there".into() },
            Message::Leave,
            Message::Ok,
            Message::Err { reason: "username taken".into() },
            Message::Msg { name: "alice".into(), body: "hi".into() },
            Message::Joined { name: "bob".into() },
            Message::Left { name: "bob".into() },
        ]
    }

    #[test]
    fn test_decode_inverts_encode() {
        for msg in all_variants() {
            let line = msg.encode();
            assert_eq!(Message::decode(&line).unwrap(), msg, "line: {}", line);
        }
    }

    #[test]
    fn test_encode_wire_forms() {
        assert_eq!(Message::Leave.encode(), "LEAVE");
        assert_eq!(Message::Ok.encode(), "OK");
        assert_eq!(
            Message::Msg { name: "alice".into(), body: "a|b".into() }.encode(),
            "MSG|alice|a|b"
        );
        assert_eq!(
            Message::Err { reason: "expected JOIN message".into() }.to_string(),
            "ERR|expected JOIN message"
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(Message::decode(""), Err(DecodeError::InvalidMessage));
        assert_eq!(Message::decode("UNKNOWN|x"), Err(DecodeError::InvalidMessage));
        assert_eq!(Message::decode("join|alice"), Err(DecodeError::InvalidMessage));
    }

    #[test]
    fn test_decode_missing_or_empty_fields() {
        for line in ["JOIN", "JOIN|", "SEND", "SEND|", "ERR", "JOINED|", "LEFT"] {
            assert_eq!(Message::decode(line), Err(DecodeError::InvalidMessage), "{}", line);
        }
        for line in ["MSG", "MSG|alice", "MSG||hi", "MSG|alice|"] {
            assert_eq!(Message::decode(line), Err(DecodeError::InvalidMessage), "{}", line);
        }
    }

    #[test]
    fn test_msg_body_keeps_separators() {
        let msg: Message = "MSG|alice|a|b|c".parse().unwrap();
        assert_eq!(
            msg,
            Message::Msg { name: "alice".into(), body: "a|b|c".into() }
        );
    }

    #[test]
    fn test_send_body_keeps_separators() {
        assert_eq!(
            Message::decode("SEND|x|y").unwrap(),
            Message::Send { body: "x|y".into() }
        );
    }

    #[test]
    fn test_join_error_to_err_line() {
        assert_eq!(
            Message::from(JoinError::UsernameTaken).encode(),
            "ERR|username taken"
        );
        assert_eq!(
            Message::from(JoinError::ExpectedJoin).encode(),
            "ERR|expected JOIN message"
        );
    }

    #[test]
    fn test_bare_tokens_ignore_trailing_fields() {
        assert_eq!(Message::decode("LEAVE|now").unwrap(), Message::Leave);
        assert_eq!(Message::decode("OK|").unwrap(), Message::Ok);
    }
}
