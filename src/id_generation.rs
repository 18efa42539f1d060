//! Identifier generation.
//!
//! Two generators share the minimal [`IdGenerator`] contract:
//!
//! - [`UlidGenerator`]: 26-character, lexicographically sortable identifiers
//!   made of a 48-bit millisecond timestamp and 80 random bits, encoded in
//!   Crockford base32. Used for ticket ids.
//! - [`HexIdGenerator`]: 32 random lower-case hex characters for contexts that
//!   don't need ordering.
//!
//! Randomness comes from the operating system. If the OS source fails the
//! generators return [`TasklineError::GenerationFailed`] instead of falling
//! back to a weaker value.

use crate::{
    domain::ticket::{TicketId, CROCKFORD_ALPHABET, TICKET_ID_LENGTH, TIMESTAMP_LENGTH},
    error::{Result, TasklineError},
};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use std::sync::Mutex;
use tracing::{debug, warn};

const RANDOM_BITS: u32 = 80;
const MAX_TIMESTAMP: u64 = (1 << 48) - 1;

/// Minimal identifier contract
pub trait IdGenerator: Send + Sync {
    /// Produces a new identifier
    fn generate(&self) -> Result<String>;
}

/// Time-ordered identifier generator with monotonic ordering inside one process
#[derive(Debug, Default)]
pub struct UlidGenerator {
    last: Mutex<Option<(u64, u128)>>,
}

impl UlidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a typed ticket id
    pub fn generate_ticket_id(&self) -> Result<TicketId> {
        self.generate()?.parse()
    }

    fn generate_at(&self, timestamp_ms: u64) -> Result<String> {
        if timestamp_ms > MAX_TIMESTAMP {
            return Err(TasklineError::GenerationFailed(format!(
                "timestamp {} does not fit in 48 bits",
                timestamp_ms
            )));
        }

        let mut last = self
            .last
            .lock()
            .map_err(|_| TasklineError::GenerationFailed("generator state poisoned".to_string()))?;

        let previous = *last;
        let random = match previous {
            // Same (or earlier, if the clock stepped back) millisecond: keep ordering by
            // incrementing the previous random component instead of drawing a new one
            Some((prev_ts, prev_random)) if timestamp_ms <= prev_ts => {
                let next = prev_random + 1;
                if next >> RANDOM_BITS != 0 {
                    warn!(timestamp_ms, "Random component exhausted within one millisecond");
                    return Err(TasklineError::GenerationFailed(
                        "random component overflow".to_string(),
                    ));
                }
                *last = Some((prev_ts, next));
                return Ok(encode(prev_ts, next));
            }
            _ => random_component()?,
        };

        *last = Some((timestamp_ms, random));
        Ok(encode(timestamp_ms, random))
    }
}

impl IdGenerator for UlidGenerator {
    fn generate(&self) -> Result<String> {
        let now = u64::try_from(Utc::now().timestamp_millis()).map_err(|_| {
            TasklineError::GenerationFailed("system clock is before the Unix epoch".to_string())
        })?;
        let id = self.generate_at(now)?;
        debug!(id = %id, "Generated sortable identifier");
        Ok(id)
    }
}

/// Purely random 32-character hex identifier generator
#[derive(Debug, Default, Clone, Copy)]
pub struct HexIdGenerator;

impl HexIdGenerator {
    pub const LENGTH: usize = 32;

    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for HexIdGenerator {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TasklineError::GenerationFailed(e.to_string()))?;
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Ok(uuid.simple().to_string())
    }
}

fn random_component() -> Result<u128> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes[6..])
        .map_err(|e| TasklineError::GenerationFailed(e.to_string()))?;
    Ok(u128::from_be_bytes(bytes))
}

fn encode(timestamp_ms: u64, random: u128) -> String {
    let value = (u128::from(timestamp_ms) << RANDOM_BITS) | random;
    let mut out = [0u8; TICKET_ID_LENGTH];
    for (i, slot) in out.iter_mut().enumerate() {
        let shift = 5 * (TICKET_ID_LENGTH - 1 - i);
        *slot = CROCKFORD_ALPHABET[((value >> shift) & 0x1f) as usize];
    }
    out.iter().map(|&b| b as char).collect()
}
