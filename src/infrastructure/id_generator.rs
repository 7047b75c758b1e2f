// ID Generators - primary keys synthesised on the create path
// Text ids are random UUIDs; numeric ids are snowflake-like 64-bit values.

use serde_json::Value;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Source of fresh primary key values.
pub trait IdGenerator: Send + Sync {
    fn next_value(&self) -> AppResult<Value>;
}

/// Random v4 UUIDs rendered as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_value(&self) -> AppResult<Value> {
        Ok(Value::String(Uuid::new_v4().to_string()))
    }
}

/// Snowflake-like numeric ids.
/// 64-bit ID format: [timestamp:42][shard_id:10][sequence:12]
/// This allows for 1024 shards and 4096 IDs per millisecond per shard
#[derive(Debug)]
pub struct SnowflakeIdGenerator {
    shard_id: u16,
    // (last timestamp, next sequence)
    state: Mutex<(u64, u64)>,
}

impl SnowflakeIdGenerator {
    pub fn new(shard_id: u16) -> AppResult<Self> {
        if shard_id >= 1024 {
            return Err(AppError::IdGenerationError(format!(
                "Shard ID must be less than 1024, got {}",
                shard_id
            )));
        }

        Ok(Self {
            shard_id,
            state: Mutex::new((0, 0)),
        })
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    /// Generate next unique ID with embedded shard information
    pub fn next_id(&self) -> AppResult<i64> {
        self.next_id_at(Self::now_millis())
    }

    /// Never waits: once a millisecond's sequence is spent, issuing moves on
    /// to the following millisecond ahead of the wall clock.
    fn next_id_at(&self, now: u64) -> AppResult<i64> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AppError::IdGenerationError("ID generator lock poisoned".to_string()))?;

        // A clock behind the last issued timestamp keeps issuing from it.
        let mut timestamp = now.max(state.0);
        if timestamp == state.0 && state.1 >= 4096 {
            timestamp += 1;
        }
        if timestamp != state.0 {
            *state = (timestamp, 0);
        }

        let sequence = state.1;
        state.1 += 1;

        let id = ((timestamp & 0x3FF_FFFF_FFFF) << 22) // 42 bits timestamp
            | ((self.shard_id as u64) << 12) // 10 bits shard_id
            | (sequence & 0xFFF); // 12 bits sequence

        Ok(id as i64)
    }

    /// Extract shard ID from a generated ID
    pub fn extract_shard_id(id: i64) -> u16 {
        ((id as u64) >> 12 & 0x3FF) as u16
    }

    /// Extract timestamp from a generated ID
    pub fn extract_timestamp(id: i64) -> u64 {
        (id as u64) >> 22
    }

    /// Extract sequence from a generated ID
    pub fn extract_sequence(id: i64) -> u16 {
        ((id as u64) & 0xFFF) as u16
    }

    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }
}

impl IdGenerator for SnowflakeIdGenerator {
    fn next_value(&self) -> AppResult<Value> {
        self.next_id().map(Value::from)
    }
}
