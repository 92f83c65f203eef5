//! Error kinds shared by every layer of the render core.
//!
//! §7 of the design groups all failures into four kinds. Each crate defines
//! its own `thiserror` enum for its own failure modes, but every variant
//! reports one of these kinds so a host can react uniformly (e.g. treat
//! `Memory` and `Resource` the same way, always surface `Format` with its
//! path/line).

use std::fmt;

/// Coarse failure category, orthogonal to which crate raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller misuse; would be an assertion failure in a debug build.
    Argument,
    /// Persisted data violated the expected schema.
    Format,
    /// Allocation failure.
    Memory,
    /// A fixed-capacity table is full.
    Resource,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Argument => "ARGUMENT",
            ErrorKind::Format => "FORMAT",
            ErrorKind::Memory => "MEMORY",
            ErrorKind::Resource => "RESOURCE",
        };
        f.write_str(s)
    }
}

/// Implemented by every crate-local error enum so callers can recover the
/// coarse kind without matching on crate-specific variants.
pub trait KindedError {
    fn kind(&self) -> ErrorKind;
}

/// A `Format` error additionally carries the byte/line position it was
/// found at, mirroring the original's `Streader` line tracking.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (line {line})")]
pub struct FormatError {
    pub message: String,
    pub line: u32,
}

impl FormatError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_display_includes_line() {
        let err = FormatError::new("unexpected token", 42);
        assert_eq!(err.to_string(), "unexpected token (line 42)");
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Argument.to_string(), "ARGUMENT");
        assert_eq!(ErrorKind::Resource.to_string(), "RESOURCE");
    }
}
