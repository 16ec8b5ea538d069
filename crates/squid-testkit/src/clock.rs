//! Controllable time source for deterministic testing

use async_trait::async_trait;
use parking_lot::Mutex;
use squid_core::{PhysicalTime, PhysicalTimeEffects, TimeError};
use std::sync::Arc;
use std::time::Duration;

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ControllableClock {
    now_ms: Arc<Mutex<u64>>,
}

impl ControllableClock {
    /// Start at the given Unix millisecond timestamp
    pub fn new(initial_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(Mutex::new(initial_ms)),
        }
    }

    /// 2023-11-14T22:13:20Z, a fixed instant used by most tests
    pub fn at_default_epoch() -> Self {
        Self::new(1_700_000_000_000)
    }

    /// Advance by a duration
    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.advance_ms(ms);
    }

    /// Advance by milliseconds
    pub fn advance_ms(&self, ms: u64) {
        let mut now = self.now_ms.lock();
        *now = now.saturating_add(ms);
    }

    /// Jump to an absolute instant
    pub fn set_ms(&self, ms: u64) {
        *self.now_ms.lock() = ms;
    }

    /// Current instant
    pub fn now(&self) -> PhysicalTime {
        PhysicalTime::from_millis(*self.now_ms.lock())
    }
}

impl Default for ControllableClock {
    fn default() -> Self {
        Self::at_default_epoch()
    }
}

#[async_trait]
impl PhysicalTimeEffects for ControllableClock {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clock_moves_only_when_advanced() {
        let clock = ControllableClock::new(10);
        assert_eq!(clock.physical_time().await.unwrap().ts_ms, 10);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.physical_time().await.unwrap().ts_ms, 1_010);
        clock.set_ms(5);
        assert_eq!(clock.now().ts_ms, 5);
    }
}
