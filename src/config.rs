//! Server tuning knobs

use std::time::Duration;

/// Time allowed for the first JOIN line
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pending outbound lines per session before new ones are dropped
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Time a departing session gets to flush its outbox before being closed
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest accepted line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Per-server settings shared by every connection
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub handshake_timeout: Duration,
    pub outbox_capacity: usize,
    pub max_line_length: usize,
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
