//! Error Values
//!
//! This module defines the payload carried from a `throw` to its matching
//! handler: a numeric code, a bounded human-readable message, and the source
//! location that raised it.
//!
//! # Bounds
//!
//! Messages are capped at [`MESSAGE_MAX`] bytes and source file names at
//! [`FILE_MAX`] bytes. Oversized input is truncated on a UTF-8 character
//! boundary, never rejected; text is also cut at the first interior NUL so
//! stored strings are always null-free. The file field keeps only the final
//! path component.
//!
//! # Example
//!
//! ```rust,ignore
//! use recoil::{ErrorCode, ErrorValue};
//!
//! let err = ErrorValue::new(ErrorCode::Parse, "unexpected token ')'");
//! assert_eq!(err.code(), 3);
//! err.print(); // [lib.rs:4] ERR 3: unexpected token ')'
//! ```

use thiserror::Error;

/// Maximum stored message length in bytes.
pub const MESSAGE_MAX: usize = 511;

/// Maximum stored source file name length in bytes.
pub const FILE_MAX: usize = 63;

/// Error taxonomy.
///
/// The first five variants carry fixed codes; `Os` carries a raw operating
/// system error number for platform-originated failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A file operation failed (code 1).
    File,
    /// An allocation failed (code 2).
    Memory,
    /// Input could not be parsed (code 3).
    Parse,
    /// An argument was invalid (code 4).
    Invalid,
    /// A fixed resource limit was exceeded (code 5).
    Limit,
    /// A raw OS error number.
    Os(i32),
}

impl ErrorCode {
    /// Get the numeric code carried by an [`ErrorValue`].
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::File => 1,
            ErrorCode::Memory => 2,
            ErrorCode::Parse => 3,
            ErrorCode::Invalid => 4,
            ErrorCode::Limit => 5,
            ErrorCode::Os(code) => code,
        }
    }

    /// Canned message for throws that do not supply their own.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorCode::File => "file operation failed",
            ErrorCode::Memory => "out of memory",
            ErrorCode::Parse => "parse failure",
            ErrorCode::Invalid => "invalid argument",
            ErrorCode::Limit => "resource limit exceeded",
            ErrorCode::Os(_) => "os error",
        }
    }
}

/// The payload carried from a throw to its matching handler.
///
/// Built once, never mutated after construction, cheap to clone. The handler
/// receives it by value and decides whether to report it, retry, convert it
/// into a different error, or let the enclosing flow terminate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{file}:{line}] ERR {code}: {message}")]
pub struct ErrorValue {
    code: i32,
    message: String,
    file: String,
    line: u32,
}

impl ErrorValue {
    /// Build an error value, capturing the caller's file and line.
    #[track_caller]
    pub fn new(code: ErrorCode, message: impl AsRef<str>) -> Self {
        let location = std::panic::Location::caller();
        Self::with_location(code, message, location.file(), location.line())
    }

    /// Build an error value with an explicit source location.
    ///
    /// Never fails: the message is truncated into its bound and the file is
    /// reduced to its final path component before truncation.
    pub fn with_location(
        code: ErrorCode,
        message: impl AsRef<str>,
        file: &str,
        line: u32,
    ) -> Self {
        Self {
            code: code.as_i32(),
            message: bounded(message.as_ref(), MESSAGE_MAX),
            file: bounded(basename(file), FILE_MAX),
            line,
        }
    }

    /// Get the numeric code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Get the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source file basename.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Get the source line.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Write `[file:line] ERR code: message` to stderr.
    ///
    /// A no-op when the message is empty.
    pub fn print(&self) {
        if !self.message.is_empty() {
            eprintln!("{self}");
        }
    }
}

/// Final path component of `path`, accepting both `/` and `\` separators.
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Copy `text` into the bound: cut at the first interior NUL, then truncate
/// to at most `max` bytes on a character boundary.
fn bounded(text: &str, max: usize) -> String {
    let text = text.split('\0').next().unwrap_or("");
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
