//! Connection numbering for log spans

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONN: AtomicU64 = AtomicU64::new(1);

/// Sequence number of an accepted connection
///
/// Lets log lines from the handshake be tied together before a name exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(u64);

impl ConnId {
    /// Take the next number; process-wide, never reused
    pub fn next() -> Self {
        Self(NEXT_CONN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
