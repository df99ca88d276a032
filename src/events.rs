//! The two event channels a host uses to drive a backend
use log::trace;
use std::fmt;

use crate::error::BackendError;
use crate::snapshot::FlushSnapshot;

/// Callback that receives one status value: `(error, source, stat, value)`
pub type StatusWriter<'a> = dyn FnMut(Option<&BackendError>, &str, &str, f64) + 'a;

/// Handler for the `flush` channel
pub type FlushHandler = Box<dyn Fn(i64, &FlushSnapshot) + Send + Sync>;

/// Handler for the `status` channel
pub type StatusHandler = Box<dyn Fn(&mut StatusWriter<'_>) + Send + Sync>;

/// Named event channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChannel {
    Flush,
    Status,
}

impl EventChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventChannel::Flush => "flush",
            EventChannel::Status => "status",
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a backend registers its handlers during init
pub trait EventRegistrar {
    /// Register a handler for the `flush` channel
    fn on_flush(&mut self, handler: FlushHandler);

    /// Register a handler for the `status` channel
    fn on_status(&mut self, handler: StatusHandler);
}

/// An in-process event host that fans each event out to every registered handler
#[derive(Default)]
pub struct EventBus {
    flush_handlers: Vec<FlushHandler>,
    status_handlers: Vec<StatusHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers registered on a channel
    pub fn handler_count(&self, channel: EventChannel) -> usize {
        match channel {
            EventChannel::Flush => self.flush_handlers.len(),
            EventChannel::Status => self.status_handlers.len(),
        }
    }

    /// Deliver a flush tick to every handler
    pub fn emit_flush(&self, timestamp: i64, snapshot: &FlushSnapshot) {
        trace!(
            "Emitting {} to {} handlers",
            EventChannel::Flush,
            self.flush_handlers.len()
        );
        for handler in &self.flush_handlers {
            handler(timestamp, snapshot);
        }
    }

    /// Ask every handler to report its status through `writer`
    pub fn emit_status(&self, writer: &mut StatusWriter<'_>) {
        trace!(
            "Emitting {} to {} handlers",
            EventChannel::Status,
            self.status_handlers.len()
        );
        for handler in &self.status_handlers {
            handler(writer);
        }
    }
}

impl EventRegistrar for EventBus {
    fn on_flush(&mut self, handler: FlushHandler) {
        self.flush_handlers.push(handler);
    }

    fn on_status(&mut self, handler: StatusHandler) {
        self.status_handlers.push(handler);
    }
}
