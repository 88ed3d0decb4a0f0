#![forbid(unsafe_code)]

//! Forwarding of `tracing` events to a host log transport.
//!
//! [`HostLogLayer`] is a `tracing_subscriber` layer. Each event is formatted
//! as `target: message key=value ...` and either handed straight to a
//! thread-safe [`LogTransport`] or queued in a bounded [`LogBuffer`] that the
//! host drains on its own schedule. The buffered form exists for transports
//! that are not `Send` (a JS callback, for instance).

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;

/// Host log levels, numbered as the host expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

impl LogLevel {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            _ => Self::Error,
        }
    }
}

/// Receives formatted log lines.
pub trait LogTransport {
    fn transport(&self, level: LogLevel, message: &str);
}

/// One formatted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

/// Bounded queue of formatted events. When full, the oldest record is
/// dropped.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    records: Arc<Mutex<VecDeque<LogRecord>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, record: LogRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every queued record, oldest first.
    pub fn drain(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Drain into `transport`. Returns how many records were delivered.
    ///
    /// The lock is released before the transport runs, so a transport that
    /// logs does not deadlock.
    pub fn forward_to(&self, transport: &dyn LogTransport) -> usize {
        let records = self.drain();
        for record in &records {
            transport.transport(record.level, &record.message);
        }
        records.len()
    }
}

enum Sink {
    Buffer(LogBuffer),
    Direct(Arc<dyn LogTransport + Send + Sync>),
}

/// `tracing_subscriber` layer that feeds a host transport.
pub struct HostLogLayer {
    sink: Sink,
    min_level: LogLevel,
}

impl HostLogLayer {
    /// Layer that queues records; the returned buffer is the drain side.
    pub fn buffered(capacity: usize) -> (Self, LogBuffer) {
        let buffer = LogBuffer::new(capacity);
        (
            Self {
                sink: Sink::Buffer(buffer.clone()),
                min_level: LogLevel::Trace,
            },
            buffer,
        )
    }

    /// Layer that calls `transport` synchronously for every event.
    pub fn direct(transport: Arc<dyn LogTransport + Send + Sync>) -> Self {
        Self {
            sink: Sink::Direct(transport),
            min_level: LogLevel::Trace,
        }
    }

    /// Drop events below `level`.
    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }
}

impl core::fmt::Debug for HostLogLayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sink = match &self.sink {
            Sink::Buffer(_) => "buffer",
            Sink::Direct(_) => "direct",
        };
        f.debug_struct("HostLogLayer")
            .field("sink", &sink)
            .field("min_level", &self.min_level)
            .finish()
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn push(&mut self, field: &Field, value: core::fmt::Arguments<'_>) {
        if field.name() == "message" {
            let _ = self.message.write_fmt(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn finish(self, target: &str) -> String {
        format!("{target}: {}{}", self.message, self.fields)
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn core::fmt::Debug) {
        self.push(field, format_args!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, format_args!("{value}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, format_args!("{value}"));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, format_args!("{value}"));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, format_args!("{value}"));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, format_args!("{value}"));
    }
}

impl<S> tracing_subscriber::Layer<S> for HostLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = LogLevel::from(*metadata.level());
        if level < self.min_level {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = visitor.finish(metadata.target());
        match &self.sink {
            Sink::Buffer(buffer) => buffer.push(LogRecord {
                level,
                target: metadata.target().to_owned(),
                message,
            }),
            Sink::Direct(transport) => transport.transport(level, &message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(LogLevel, String)>>);

    impl LogTransport for Collect {
        fn transport(&self, level: LogLevel, message: &str) {
            self.0
                .lock()
                .expect("collector lock")
                .push((level, message.to_owned()));
        }
    }

    #[test]
    fn direct_transport_receives_formatted_events() {
        let collect = Arc::new(Collect::default());
        let subscriber = tracing_subscriber::registry().with(HostLogLayer::direct(collect.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "vhb.registry", id = 7, "no pending request");
            tracing::error!(target: "vhb.context", "bad payload");
        });
        let seen = collect.0.lock().expect("collector lock").clone();
        assert_eq!(
            seen,
            vec![
                (
                    LogLevel::Warn,
                    "vhb.registry: no pending request id=7".to_owned()
                ),
                (LogLevel::Error, "vhb.context: bad payload".to_owned()),
            ]
        );
    }

    #[test]
    fn min_level_filters() {
        let collect = Arc::new(Collect::default());
        let layer = HostLogLayer::direct(collect.clone()).with_min_level(LogLevel::Warn);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "vhb.pool", "created");
            tracing::info!(target: "vhb.pool", "ignored");
            tracing::warn!(target: "vhb.pool", "kept");
        });
        assert_eq!(collect.0.lock().expect("collector lock").len(), 1);
    }

    #[test]
    fn buffer_is_bounded_and_drains_in_order() {
        let (layer, buffer) = HostLogLayer::buffered(2);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            for n in 0..3 {
                tracing::info!(target: "vhb.audio", n, "tick");
            }
        });
        assert_eq!(buffer.len(), 2);
        let records = buffer.drain();
        assert_eq!(
            records
                .iter()
                .map(|r| r.message.as_str())
                .collect::<Vec<_>>(),
            vec!["vhb.audio: tick n=1", "vhb.audio: tick n=2"]
        );
        assert_eq!(records[0].target, "vhb.audio");
        assert!(buffer.is_empty());
    }

    #[test]
    fn forward_to_single_threaded_transport() {
        struct Local(RefCell<Vec<i32>>);
        impl LogTransport for Local {
            fn transport(&self, level: LogLevel, _message: &str) {
                self.0.borrow_mut().push(level.code());
            }
        }

        let (layer, buffer) = HostLogLayer::buffered(16);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!(target: "vhb.marshal", "a");
            tracing::error!(target: "vhb.marshal", "b");
        });
        let local = Local(RefCell::new(Vec::new()));
        assert_eq!(buffer.forward_to(&local), 2);
        assert_eq!(*local.0.borrow(), vec![0, 4]);
        assert_eq!(buffer.forward_to(&local), 0);
    }

    #[test]
    fn level_mapping() {
        assert_eq!(LogLevel::from(tracing::Level::TRACE), LogLevel::Trace);
        assert_eq!(LogLevel::from(tracing::Level::ERROR).code(), 4);
        assert_eq!(LogLevel::Critical.as_str(), "critical");
    }
}
