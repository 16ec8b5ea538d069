//! Physical time effect

use crate::errors::TimeError;
use crate::time::PhysicalTime;
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time for timestamps, expiry and retention.
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current wall-clock time.
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError>;
}

/// Production clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl PhysicalTimeEffects for SystemClock {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TimeError::BeforeEpoch)?;
        let ts_ms = u64::try_from(elapsed.as_millis()).map_err(|_| TimeError::ServiceUnavailable)?;
        Ok(PhysicalTime::from_millis(ts_ms))
    }
}
