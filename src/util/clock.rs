use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::firestore::model::Timestamp;

/// Source of "now" for ledger stamps, node headers and read timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

pub type ClockArc = Arc<dyn Clock>;

/// Wall clock backed by `chrono::Utc::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::new(Timestamp::from_millis(millis))
    }

    pub fn set(&self, timestamp: Timestamp) {
        *self.now.lock().unwrap() = timestamp;
    }

    /// Moves the clock forward and returns the new instant.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut now = self.now.lock().unwrap();
        *now = Timestamp::from_millis(now.to_millis() + by.as_millis() as i64);
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}
