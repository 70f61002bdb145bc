//! Snowflake ID Allocator
//!
//! Twitter-style time-ordered unique ID generation.
//!
//! Layout of an issued id:
//!
//! ```text
//! 63                      22         17         12          0
//! +-------------------------+----------+----------+-----------+
//! |  ms since custom epoch  | datacen. |  worker  |  sequence |
//! |        (42 bits)        | (5 bits) | (5 bits) | (12 bits) |
//! +-------------------------+----------+----------+-----------+
//! ```
//!
//! An allocator is not synchronized. Keep one per process behind a mutex.

use chrono::Utc;

/// Default custom epoch (2019-01-01T00:00:00.000Z)
pub const DEFAULT_EPOCH: u64 = 1_546_300_800_000;

/// Largest accepted worker / datacenter id (5 bits)
pub const MAX_NODE_ID: u8 = 0x1F;

const SEQUENCE_MASK: u16 = 0xFFF;
const SEQUENCE_BITS: u64 = 12;
const WORKER_SHIFT: u64 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u64 = SEQUENCE_BITS + 5;
const TIMESTAMP_SHIFT: u64 = SEQUENCE_BITS + 10;

/// Snowflake allocation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnowflakeError {
    #[error("Worker id {0} is out of range (0..=31)")]
    InvalidWorkerId(u8),

    #[error("Datacenter id {0} is out of range (0..=31)")]
    InvalidDatacenterId(u8),

    #[error("Clock moved backwards: last issued at {last_ms}ms, now {now_ms}ms")]
    ClockMovedBackwards { last_ms: u64, now_ms: u64 },

    #[error("Clock {now_ms}ms is before the configured epoch {epoch_ms}ms")]
    BeforeEpoch { now_ms: u64, epoch_ms: u64 },
}

/// Millisecond wall clock source
pub trait Clock: Send {
    /// Current time in milliseconds since the Unix epoch
    fn now_millis(&mut self) -> u64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&mut self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Snowflake ID allocator
pub struct IdAllocator<C: Clock = SystemClock> {
    worker_id: u8,
    datacenter_id: u8,
    epoch: u64,
    sequence: u16,
    last_timestamp: Option<u64>,
    clock: C,
}

impl IdAllocator<SystemClock> {
    /// Create an allocator driven by the system clock
    pub fn new(worker_id: u8, datacenter_id: u8, epoch: u64) -> Result<Self, SnowflakeError> {
        Self::with_clock(worker_id, datacenter_id, epoch, SystemClock)
    }
}

impl<C: Clock> IdAllocator<C> {
    /// Create an allocator with a custom clock source
    pub fn with_clock(
        worker_id: u8,
        datacenter_id: u8,
        epoch: u64,
        clock: C,
    ) -> Result<Self, SnowflakeError> {
        if worker_id > MAX_NODE_ID {
            return Err(SnowflakeError::InvalidWorkerId(worker_id));
        }
        if datacenter_id > MAX_NODE_ID {
            return Err(SnowflakeError::InvalidDatacenterId(datacenter_id));
        }

        Ok(Self {
            worker_id,
            datacenter_id,
            epoch,
            sequence: 0,
            last_timestamp: None,
            clock,
        })
    }

    /// Issue the next id.
    ///
    /// Fails without issuing anything if the clock reads earlier than the
    /// previously issued timestamp.
    pub fn gen_id(&mut self) -> Result<u64, SnowflakeError> {
        let mut timestamp = self.clock.now_millis();

        let sequence = match self.last_timestamp {
            Some(last) if timestamp < last => {
                return Err(SnowflakeError::ClockMovedBackwards {
                    last_ms: last,
                    now_ms: timestamp,
                });
            }
            Some(last) if timestamp == last => {
                let next = (self.sequence + 1) & SEQUENCE_MASK;
                if next == 0 {
                    timestamp = self.wait_next_millis(last)?;
                }
                next
            }
            _ => 0,
        };

        if timestamp < self.epoch {
            return Err(SnowflakeError::BeforeEpoch {
                now_ms: timestamp,
                epoch_ms: self.epoch,
            });
        }

        self.sequence = sequence;
        self.last_timestamp = Some(timestamp);

        Ok(((timestamp - self.epoch) << TIMESTAMP_SHIFT)
            | (u64::from(self.datacenter_id) << DATACENTER_SHIFT)
            | (u64::from(self.worker_id) << WORKER_SHIFT)
            | u64::from(sequence))
    }

    /// Spin until the clock passes `last`
    fn wait_next_millis(&mut self, last: u64) -> Result<u64, SnowflakeError> {
        loop {
            let now = self.clock.now_millis();
            if now > last {
                return Ok(now);
            }
            if now < last {
                return Err(SnowflakeError::ClockMovedBackwards {
                    last_ms: last,
                    now_ms: now,
                });
            }
            std::hint::spin_loop();
        }
    }
}
