use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Source tag reported with every self-health field
pub const STATUS_SOURCE: &str = "kafka";

/// The backend's own health, updated by the publisher and read by status reports.
///
/// Each field is atomic on its own; readers may see fields from two
/// different publishes but never a torn value.
#[derive(Debug)]
pub struct SelfStats {
    /// Epoch seconds of the last completed publish
    last_flush: AtomicI64,
    /// Epoch seconds of the last failure
    last_exception: AtomicI64,
    /// Milliseconds the last completed publish took
    flush_time: AtomicU64,
    /// Bytes sent by the last completed publish
    flush_length: AtomicU64,
}

impl SelfStats {
    /// Create stats stamped with the process start time
    pub fn new(startup_time: i64) -> Self {
        Self {
            last_flush: AtomicI64::new(startup_time),
            last_exception: AtomicI64::new(startup_time),
            flush_time: AtomicU64::new(0),
            flush_length: AtomicU64::new(0),
        }
    }

    pub fn last_flush(&self) -> i64 {
        self.last_flush.load(Ordering::Relaxed)
    }

    pub fn last_exception(&self) -> i64 {
        self.last_exception.load(Ordering::Relaxed)
    }

    pub fn flush_time(&self) -> u64 {
        self.flush_time.load(Ordering::Relaxed)
    }

    pub fn flush_length(&self) -> u64 {
        self.flush_length.load(Ordering::Relaxed)
    }

    /// Record a completed publish
    pub fn record_flush(&self, flush_time_ms: u64, flush_length: u64) {
        self.flush_time.store(flush_time_ms, Ordering::Relaxed);
        self.flush_length.store(flush_length, Ordering::Relaxed);
        self.last_flush.store(now(), Ordering::Relaxed);
    }

    /// Record a failure at the current time
    pub fn record_exception(&self) {
        self.last_exception.store(now(), Ordering::Relaxed);
    }

    /// Every field with its current value, in a stable order
    pub fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("last_flush", self.last_flush() as f64),
            ("last_exception", self.last_exception() as f64),
            ("flush_time", self.flush_time() as f64),
            ("flush_length", self.flush_length() as f64),
        ]
    }
}

/// Current time in epoch seconds
pub fn now() -> i64 {
    Utc::now().timestamp()
}
