use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z in milliseconds since Unix epoch.
const TANDEM_EPOCH_MS: u64 = 1_735_689_600_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const TIMESTAMP_SHIFT: u64 = WORKER_BITS + SEQUENCE_BITS;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1; // 4095

/// 64-bit snowflake ID generator used for chat message identifiers, where
/// ids must be unique and carry their emission time.
///
/// Layout (MSB → LSB): 42 bits of milliseconds since the Tandem epoch,
/// 10 bits of worker id, 12 bits of per-millisecond sequence.
pub struct SnowflakeGenerator {
    worker_id: u64,
    clock: Mutex<Clock>,
}

struct Clock {
    last_ms: u64,
    sequence: u64,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Self {
        assert!(
            (worker_id as u64) < (1 << WORKER_BITS),
            "worker_id must fit in {WORKER_BITS} bits"
        );
        Self {
            worker_id: worker_id as u64,
            clock: Mutex::new(Clock {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut clock = self.clock.lock().unwrap();

        let mut now_ms = current_ms();
        if now_ms < clock.last_ms {
            panic!(
                "Clock moved backwards: last_ms={}, now_ms={}",
                clock.last_ms, now_ms
            );
        }

        if now_ms == clock.last_ms {
            clock.sequence = (clock.sequence + 1) & SEQUENCE_MASK;
            if clock.sequence == 0 {
                // Sequence exhausted for this millisecond — spin-wait.
                while now_ms == clock.last_ms {
                    now_ms = current_ms();
                }
            }
        } else {
            clock.sequence = 0;
        }
        clock.last_ms = now_ms;

        let ts = now_ms - TANDEM_EPOCH_MS;
        ((ts << TIMESTAMP_SHIFT) | (self.worker_id << SEQUENCE_BITS) | clock.sequence) as i64
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before Unix epoch")
        .as_millis() as u64
}

/// Extract the creation timestamp (ms since Unix epoch) from a snowflake ID.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    ((id as u64) >> TIMESTAMP_SHIFT) + TANDEM_EPOCH_MS
}
