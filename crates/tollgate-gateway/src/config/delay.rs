//! The global API delay, the only configuration value mutated at runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cloneable handle to the shared global delay in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct DelayHandle {
    millis: Arc<AtomicU64>,
}

impl DelayHandle {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    pub fn get(&self) -> u64 {
        self.millis.load(Ordering::Acquire)
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::Release);
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.get())
    }
}
