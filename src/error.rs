//! # Error Taxonomy
//!
//! All fallible operations in vectra return `eyre::Result`. Failures that
//! callers need to classify carry an [`EngineError`] at the root of the
//! report chain, tagged with an [`ErrorCode`].
//!
//! ## Error Families
//!
//! | Family | Codes | Recovery |
//! |--------|-------|----------|
//! | Bind errors | 400-499 | Caller fixes the query; no cursor is built |
//! | Resource errors | 500-599 | Fatal to the query; cursor tree poisoned |
//! | Cancellation | 600 | Driver-initiated; cursor tree poisoned |
//!
//! Signals (end-of-stream, waiting-on-barrier) are not errors and travel
//! through [`crate::cursor::Batch`] instead.
//!
//! ## Classifying a Failure
//!
//! ```ignore
//! match vectra::error::error_code(&report) {
//!     Some(ErrorCode::MemoryExceeded) => retry_with_larger_quota(),
//!     Some(code) if code.is_bind_error() => reject_query(report),
//!     _ => propagate(report),
//! }
//! ```

use std::fmt;

/// Stable failure classification for engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A referenced attribute does not exist in the input schema.
    AttributeMissing,
    /// An attribute name would occur twice in one schema.
    AttributeDuplicate,
    /// An expression or operator was bound against an incompatible type.
    TypeMismatch,
    /// A caller-supplied argument is out of its legal domain
    /// (e.g. duplicate sort keys, zero batch size).
    InvalidArgumentValue,
    /// A limit or offset is out of range.
    InvalidLimit,

    /// An allocation could not be satisfied within the memory quota.
    MemoryExceeded,
    /// A spill temp file could not be created.
    TempFileCreationError,
    /// A spill file failed structural or checksum validation.
    SpillCorruption,
    /// The operation reached a code path the engine does not support.
    NotImplemented,

    /// The cursor tree was interrupted by the driver.
    Interrupted,
}

impl ErrorCode {
    /// Numeric code, stable across releases. Bind errors occupy 400-499.
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::AttributeMissing => 401,
            ErrorCode::AttributeDuplicate => 402,
            ErrorCode::TypeMismatch => 403,
            ErrorCode::InvalidArgumentValue => 404,
            ErrorCode::InvalidLimit => 405,
            ErrorCode::MemoryExceeded => 501,
            ErrorCode::TempFileCreationError => 502,
            ErrorCode::SpillCorruption => 503,
            ErrorCode::NotImplemented => 504,
            ErrorCode::Interrupted => 600,
        }
    }

    /// True for errors raised while binding, before any cursor exists.
    pub fn is_bind_error(self) -> bool {
        (400..500).contains(&self.code())
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::AttributeMissing => "ATTRIBUTE_MISSING",
            ErrorCode::AttributeDuplicate => "ATTRIBUTE_DUPLICATE",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::InvalidArgumentValue => "INVALID_ARGUMENT_VALUE",
            ErrorCode::InvalidLimit => "INVALID_LIMIT",
            ErrorCode::MemoryExceeded => "MEMORY_EXCEEDED",
            ErrorCode::TempFileCreationError => "TEMP_FILE_CREATION_ERROR",
            ErrorCode::SpillCorruption => "SPILL_CORRUPTION",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::Interrupted => "INTERRUPTED",
        }
    }
}

/// Typed engine failure carried inside `eyre::Report` chains.
#[derive(Debug)]
pub struct EngineError {
    code: ErrorCode,
    message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code.name(), self.code.code(), self.message)
    }
}

impl std::error::Error for EngineError {}

/// Extracts the [`ErrorCode`] from a report, if one is in the chain.
pub fn error_code(report: &eyre::Report) -> Option<ErrorCode> {
    report
        .chain()
        .find_map(|e| e.downcast_ref::<EngineError>())
        .map(|e| e.code())
}

/// Shorthand for `bail!(EngineError::new(code, format!(...)))`.
#[macro_export]
macro_rules! engine_bail {
    ($code:expr, $($arg:tt)*) => {
        return Err(::eyre::Report::new($crate::error::EngineError::new(
            $code,
            format!($($arg)*),
        )))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_errors_are_in_the_400_range() {
        assert!(ErrorCode::AttributeMissing.is_bind_error());
        assert!(ErrorCode::InvalidArgumentValue.is_bind_error());
        assert!(!ErrorCode::MemoryExceeded.is_bind_error());
        assert!(!ErrorCode::Interrupted.is_bind_error());
    }

    #[test]
    fn error_code_survives_wrapping() {
        use eyre::WrapErr;
        let report: eyre::Report =
            eyre::Report::new(EngineError::new(ErrorCode::MemoryExceeded, "quota ran out"));
        let wrapped: eyre::Result<()> = Err(report).wrap_err("while copying a view");
        assert_eq!(
            error_code(&wrapped.unwrap_err()),
            Some(ErrorCode::MemoryExceeded)
        );
    }

    #[test]
    fn display_includes_name_and_code() {
        let err = EngineError::new(ErrorCode::Interrupted, "driver shutdown");
        let text = err.to_string();
        assert!(text.contains("INTERRUPTED"));
        assert!(text.contains("600"));
    }
}
