//! Logcat forwarding for `tracing` events mirrored through [`LoggerSink`].

use std::ffi::{c_char, c_int, CString};

use bridge_traits::error::Result;
use bridge_traits::{LogEntry, LogLevel, LoggerSink};

#[link(name = "log")]
extern "C" {
    fn __android_log_write(prio: c_int, tag: *const c_char, text: *const c_char) -> c_int;
}

const ANDROID_LOG_VERBOSE: c_int = 2;
const ANDROID_LOG_DEBUG: c_int = 3;
const ANDROID_LOG_INFO: c_int = 4;
const ANDROID_LOG_WARN: c_int = 5;
const ANDROID_LOG_ERROR: c_int = 6;

pub const DEFAULT_TAG: &str = "NativeBridge";

fn priority(level: LogLevel) -> c_int {
    match level {
        LogLevel::Trace => ANDROID_LOG_VERBOSE,
        LogLevel::Debug => ANDROID_LOG_DEBUG,
        LogLevel::Info => ANDROID_LOG_INFO,
        LogLevel::Warn => ANDROID_LOG_WARN,
        LogLevel::Error => ANDROID_LOG_ERROR,
    }
}

/// Logcat line: message followed by `key=value` fields. Interior NULs are dropped.
fn format_line(entry: &LogEntry) -> CString {
    let mut line = format!("[{}] {}", entry.target, entry.message);
    for (key, value) in &entry.fields {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(value);
    }
    line.retain(|c| c != '\0');
    CString::new(line).unwrap_or_default()
}

#[derive(Debug)]
pub struct LogcatSink {
    tag: CString,
    min_level: LogLevel,
}

impl LogcatSink {
    pub fn new(tag: &str, min_level: LogLevel) -> Self {
        let tag: String = tag.chars().filter(|c| *c != '\0').collect();
        Self {
            tag: CString::new(tag).unwrap_or_default(),
            min_level,
        }
    }
}

impl Default for LogcatSink {
    fn default() -> Self {
        Self::new(DEFAULT_TAG, LogLevel::Info)
    }
}

impl LoggerSink for LogcatSink {
    fn log(&self, entry: LogEntry) -> Result<()> {
        let line = format_line(&entry);
        unsafe {
            __android_log_write(priority(entry.level), self.tag.as_ptr(), line.as_ptr());
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}
