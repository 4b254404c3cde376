//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with the `tracing` crate, supporting:
//! - JSON, compact and pretty-print output formats
//! - Module-level filtering
//! - Redaction of push content (message text, room and profile names, keys)
//! - Mirroring into the host's log pipeline via `LoggerSink`
//!
//! ## Overview
//!
//! This module configures the `tracing-subscriber` infrastructure. When a
//! sink is configured, every event that survives filtering is also forwarded
//! to the host logger (logcat on Android) synchronously, on the thread that
//! emitted it. Engine log lines that cannot be routed into JavaScript are
//! emitted under the [`ENGINE_LOG_TARGET`] target.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug)
//!     .with_logger_sink(Arc::new(ConsoleLogger::default()));
//!
//! init_logging(config)?;
//! tracing::info!("Bridge starting");
//! ```

use crate::error::{Error, Result};

use bridge_traits::{LogEntry, LogLevel, LoggerSink};

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    layer::{Context, SubscriberExt},
    registry::{LookupSpan, Registry},
    util::SubscriberInitExt,
    Layer,
};

/// Target used for engine log lines written straight to the process log.
pub const ENGINE_LOG_TARGET: &str = "core_engine";

/// How the stdout layer renders events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line, fields flattened.
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Options consumed by [`init_logging`].
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Blank push content and credentials before they reach the host sink.
    pub redact_pii: bool,
    /// Full `EnvFilter` directive string; replaces the per-crate defaults.
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    pub display_target: bool,
    /// Thread ids and names on stdout lines. Callbacks hop threads, so this
    /// is the first thing to switch on when a trace looks out of order.
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_pii: true,
            filter: None,
            logger_sink: None,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("redact_pii", &self.redact_pii)
            .field("filter", &self.filter)
            .field("has_logger_sink", &self.logger_sink.is_some())
            .field("display_target", &self.display_target)
            .field("display_thread_info", &self.display_thread_info)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        Self { level, ..self }
    }

    pub fn with_pii_redaction(self, redact_pii: bool) -> Self {
        Self { redact_pii, ..self }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..self
        }
    }

    /// Mirror surviving events into `sink` (logcat, a host console).
    pub fn with_logger_sink(self, sink: Arc<dyn LoggerSink>) -> Self {
        Self {
            logger_sink: Some(sink),
            ..self
        }
    }

    pub fn with_target(self, display_target: bool) -> Self {
        Self {
            display_target,
            ..self
        }
    }

    pub fn with_thread_info(self, display_thread_info: bool) -> Self {
        Self {
            display_thread_info,
            ..self
        }
    }
}

/// Crates whose events follow [`LoggingConfig::level`] when no custom filter is set.
const OWN_TARGETS: &[&str] = &[
    "native_bridge",
    "bridge_traits",
    "bridge_desktop",
    "bridge_android",
    "core_runtime",
    "core_bridge",
    "core_service",
    ENGINE_LOG_TARGET,
];

/// Install the global subscriber.
///
/// Only the first call in a process succeeds; later calls report
/// [`Error::Config`] and leave the existing subscriber in place.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let stdout = stdout_layer(&config);
    let mirror = LoggerSinkLayer::new(config.logger_sink.clone(), config.redact_pii);

    tracing_subscriber::registry()
        .with(stdout)
        .with(filter)
        .with(mirror)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}

fn stdout_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info);

    match config.format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
    }
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = level_directive(config.level);
            OWN_TARGETS
                .iter()
                .map(|target| format!("{target}={level}"))
                .chain(std::iter::once("rquickjs=warn".to_string()))
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("bad log filter `{directives}`: {e}")))
}

/// Forwards every event that passes the subscriber's filter to a
/// [`LoggerSink`], on the emitting thread.
pub struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    pub fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn to_entry(&self, event: &Event<'_>) -> LogEntry {
        let metadata = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_owned());
        let level = from_tracing_level(metadata.level());

        fields
            .values
            .into_iter()
            .fold(LogEntry::new(level, metadata.target(), message), |entry, (key, value)| {
                let value = if self.redact {
                    redact_if_sensitive(&key, &value)
                } else {
                    value
                };
                entry.with_field(key, value)
            })
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };
        if from_tracing_level(event.metadata().level()) < sink.min_level() {
            return;
        }

        // Reporting through tracing here would recurse into this layer.
        if let Err(err) = sink.log(self.to_entry(event)) {
            eprintln!("logger sink rejected entry: {err}");
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: BTreeMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_owned(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

fn from_tracing_level(level: &tracing::Level) -> LogLevel {
    if *level == tracing::Level::ERROR {
        LogLevel::Error
    } else if *level == tracing::Level::WARN {
        LogLevel::Warn
    } else if *level == tracing::Level::INFO {
        LogLevel::Info
    } else if *level == tracing::Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

const PUSH_CONTENT_FIELDS: &[&str] = &[
    "text",
    "message_text",
    "profile_name",
    "room_name",
    "room_key",
    "payload",
];

const CREDENTIAL_MARKERS: &[&str] = &[
    "access_token",
    "refresh_token",
    "password",
    "secret",
    "api_key",
    "authorization",
];

/// Returns `"[REDACTED]"` for push content and credential-like field names,
/// `value` otherwise. Matching ignores case.
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// tracing::debug!(room_name = %redact_if_sensitive("room_name", &result.room_name), "Push decoded");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let name = field_name.to_ascii_lowercase();
    let sensitive = PUSH_CONTENT_FIELDS.contains(&name.as_str())
        || CREDENTIAL_MARKERS.iter().any(|marker| name.contains(marker));

    if sensitive {
        "[REDACTED]".to_owned()
    } else {
        value.to_owned()
    }
}

/// Last path component; both `/` and `\` count as separators.
///
/// ```ignore
/// use core_runtime::logging::strip_path;
///
/// tracing::info!(bundle = %strip_path("/data/user/0/app/files/main.bundle"), "Provisioned");
/// // Logs: bundle="main.bundle"
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
