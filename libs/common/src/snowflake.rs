use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z in milliseconds since Unix epoch.
const GATEHOUSE_EPOCH_MS: u64 = 1_735_689_600_000;

const NODE_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

struct State {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit time-ordered ID generator for users, cars, guests and log entries.
///
/// Layout (MSB → LSB):
/// - Bits 63–22: Timestamp (42 bits), ms since the Gatehouse epoch
/// - Bits 21–12: Node ID (10 bits)
/// - Bits 11–0:  Sequence (12 bits), per-ms counter
///
/// IDs are strictly increasing per generator. If the wall clock steps
/// backwards the generator keeps counting on the last observed millisecond
/// instead of failing.
pub struct SnowflakeGenerator {
    node_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub fn new(node_id: u16) -> Self {
        assert!(
            (node_id as u64) < (1 << NODE_BITS),
            "node_id must fit in {NODE_BITS} bits"
        );
        Self {
            node_id: node_id as u64,
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut now_ms = current_ms().max(state.last_ms);

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted; borrow the next millisecond.
                now_ms += 1;
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;

        let ts = now_ms.saturating_sub(GATEHOUSE_EPOCH_MS);
        let id = (ts << (NODE_BITS + SEQUENCE_BITS)) | (self.node_id << SEQUENCE_BITS) | state.sequence;

        id as i64
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(GATEHOUSE_EPOCH_MS)
}

/// Extract the creation timestamp (ms since Unix epoch) from a snowflake ID.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    let ts = (id as u64) >> (NODE_BITS + SEQUENCE_BITS);
    ts + GATEHOUSE_EPOCH_MS
}
