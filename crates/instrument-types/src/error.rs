// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all Instrumentation Kernel failures.
///
/// Every variant is a pure function of the input: there is no transient
/// category, so a failed call fails identically on retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    /// Malformed request payload (empty identifiers, wrong JSON shape).
    #[error("validation error: {0}")]
    Validation(String),

    /// A required field is absent from an otherwise well-formed payload.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// An option carries a value outside the recognized set.
    #[error("unsupported option {option}: {value}")]
    UnsupportedOption { option: String, value: String },

    /// The image artifact could not be decoded into pixel data.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Should never occur for well-typed input; indicates a kernel bug.
    #[error("internal computation error: {0}")]
    Internal(String),
}

/// Coarse error classification used at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    UnsupportedOption,
    InvalidImage,
    Internal,
}

impl ErrorKind {
    /// Stable public code, safe to return to callers.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::UnsupportedOption => "UNSUPPORTED_OPTION",
            Self::InvalidImage => "INVALID_IMAGE",
            Self::Internal => "INTERNAL_COMPUTATION_ERROR",
        }
    }

    /// HTTP status the transport layer should surface.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Validation | Self::UnsupportedOption => 400,
            Self::InvalidImage => 422,
            Self::Internal => 500,
        }
    }
}

impl InstrumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::MissingField(_) => ErrorKind::Validation,
            Self::UnsupportedOption { .. } => ErrorKind::UnsupportedOption,
            Self::InvalidImage(_) => ErrorKind::InvalidImage,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the caller sent bad input (4xx), false for kernel faults.
    pub fn is_caller_error(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// Message suitable for crossing the process boundary.
    ///
    /// Caller errors keep their detail (it only echoes the caller's own
    /// input); internal faults collapse to a fixed string.
    pub fn public_message(&self) -> String {
        match self {
            Self::Config(_) | Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn unsupported(option: impl Into<String>, value: impl ToString) -> Self {
        Self::UnsupportedOption {
            option: option.into(),
            value: value.to_string(),
        }
    }

    /// Build an `Internal` error and log it; internal faults are never silent.
    pub fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::error!("internal computation error: {detail}");
        Self::Internal(detail)
    }
}

pub type InstrumentResult<T> = Result<T, InstrumentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_validation() {
        let err = InstrumentError::MissingField("submissionHash".into());
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.kind().http_status(), 400);
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_internal_hides_detail() {
        let err = InstrumentError::Internal("serializer exploded at trace.rs:42".into());
        assert!(!err.is_caller_error());
        assert_eq!(err.kind().http_status(), 500);
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn test_unsupported_option_message() {
        let err = InstrumentError::unsupported("channels", "cmyk");
        assert_eq!(err.to_string(), "unsupported option channels: cmyk");
        assert_eq!(err.kind().as_str(), "UNSUPPORTED_OPTION");
    }

    #[test]
    fn test_invalid_image_status() {
        let err = InstrumentError::InvalidImage("empty artifact".into());
        assert_eq!(err.kind(), ErrorKind::InvalidImage);
        assert!(err.public_message().contains("empty artifact"));
    }
}
