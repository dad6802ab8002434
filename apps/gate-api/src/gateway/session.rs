//! Per-connection gateway session state.

use std::sync::atomic::{AtomicU64, Ordering};

/// State for a single identified WebSocket connection.
pub struct GatewaySession {
    /// The delivery channel bound at IDENTIFY (`ch_` prefixed ULID).
    pub channel_id: String,
    pub resident_id: i64,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(channel_id: String, resident_id: i64) -> Self {
        Self {
            channel_id,
            resident_id,
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}
