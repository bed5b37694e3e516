//! Logging Infrastructure
//!
//! Leveled plain-text logging for the runtime's own events: region entry and
//! exit, guard registration and release, throws. Kept self-contained so the
//! crate has no observable dependencies beyond its own output stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use recoil::log::{self, LogLevel};
//!
//! log::set_level(LogLevel::Debug);
//! log::debug("pool reset");
//! if log::would_log(LogLevel::Trace) {
//!     log::trace(format!("depth={}", depth));
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Log level enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace = 0,
    /// Debug level.
    Debug = 1,
    /// Info level.
    Info = 2,
    /// Warning level.
    Warn = 3,
    /// Error level.
    Error = 4,
    /// Off (no logging).
    Off = 5,
}

impl LogLevel {
    /// Get the level name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Off => "OFF",
        }
    }

    /// Get the level from a u8.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LogLevel::Trace),
            1 => Some(LogLevel::Debug),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Warn),
            4 => Some(LogLevel::Error),
            5 => Some(LogLevel::Off),
            _ => None,
        }
    }

    /// Parse a level name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "off" | "none" => Some(LogLevel::Off),
            _ => None,
        }
    }
}

/// Minimum level that will be emitted.
static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

/// Whether log output goes to stderr (default) or stdout.
static USE_STDERR: AtomicU8 = AtomicU8::new(1);

/// Serializes writes so concurrent threads do not interleave lines.
static SINK: Mutex<()> = Mutex::new(());

/// Set the minimum log level.
pub fn set_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Get the current minimum log level.
pub fn level() -> LogLevel {
    LogLevel::from_u8(MIN_LEVEL.load(Ordering::SeqCst)).unwrap_or(LogLevel::Warn)
}

/// Set whether to use stderr (default) or stdout.
pub fn set_use_stderr(use_stderr: bool) {
    USE_STDERR.store(u8::from(use_stderr), Ordering::SeqCst);
}

/// Check if a log level would be emitted.
pub fn would_log(level: LogLevel) -> bool {
    level != LogLevel::Off && level >= self::level()
}

/// Emit a message at the given level.
pub fn log(level: LogLevel, message: impl Into<String>) {
    if !would_log(level) {
        return;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let line = format!(
        "[{}.{:03}] {:<5} {}",
        timestamp / 1000,
        timestamp % 1000,
        level.as_str(),
        message.into()
    );

    let _guard = SINK.lock();
    if USE_STDERR.load(Ordering::SeqCst) != 0 {
        let _ = writeln!(std::io::stderr(), "{line}");
    } else {
        let _ = writeln!(std::io::stdout(), "{line}");
    }
}

/// Log at trace level.
pub fn trace(message: impl Into<String>) {
    log(LogLevel::Trace, message);
}

/// Log at debug level.
pub fn debug(message: impl Into<String>) {
    log(LogLevel::Debug, message);
}

/// Log at info level.
pub fn info(message: impl Into<String>) {
    log(LogLevel::Info, message);
}

/// Log at warn level.
pub fn warn(message: impl Into<String>) {
    log(LogLevel::Warn, message);
}

/// Log at error level.
pub fn error(message: impl Into<String>) {
    log(LogLevel::Error, message);
}
