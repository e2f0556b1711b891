//! Per-upload session state.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of one upload id.
///
/// ```text
/// Receiving ──merge──> Merging ──ok──> Done
///     │                   │
///     │                   └──missing chunk / io error / cancelled──> Receiving
///     └──abandon / idle past TTL──> Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Receiving,
    Merging,
    Done,
    Abandoned,
}

impl SessionState {
    /// Whether chunks are still accepted.
    pub fn accepts_chunks(self) -> bool {
        matches!(self, SessionState::Receiving)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &str = match self {
            SessionState::Receiving => "receiving",
            SessionState::Merging => "merging",
            SessionState::Done => "done",
            SessionState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Bookkeeping for one upload id, held in the reassembler's session table.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub state: SessionState,
    /// Chunk indices that have been stored at least once.
    pub received: BTreeSet<u32>,
    pub bytes_received: u64,
    pub last_activity: Instant,
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Receiving,
            received: BTreeSet::new(),
            bytes_received: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Idle for at least `ttl` as of `now`.
    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= ttl
    }

    /// Snapshot for callers outside the reassembler.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            chunks_received: self.received.len(),
            bytes_received: self.bytes_received,
            idle: self.last_activity.elapsed(),
        }
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub chunks_received: usize,
    pub bytes_received: u64,
    pub idle: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_receiving_accepts_chunks() {
        assert!(SessionState::Receiving.accepts_chunks());
        assert!(!SessionState::Merging.accepts_chunks());
        assert!(!SessionState::Done.accepts_chunks());
        assert!(!SessionState::Abandoned.accepts_chunks());
    }

    #[test]
    fn test_is_idle() {
        let session: UploadSession = UploadSession::new();
        let later: Instant = session.last_activity + Duration::from_secs(10);
        assert!(session.is_idle(later, Duration::from_secs(5)));
        assert!(!session.is_idle(later, Duration::from_secs(60)));
    }
}
