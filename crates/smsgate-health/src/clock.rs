//! Time source seam for deterministic window math.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" for bucket alignment and weighting.
pub trait Clock: Send + Sync {
    /// Seconds since the unix epoch, with sub-second precision.
    fn now_unix(&self) -> f64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock tests can position anywhere in a window.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(at_unix: f64) -> Self {
        Self {
            millis: AtomicU64::new((at_unix * 1000.0) as u64),
        }
    }

    pub fn set(&self, at_unix: f64) {
        self.millis.store((at_unix * 1000.0) as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.millis
            .fetch_add((seconds * 1000.0) as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> f64 {
        self.millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}
