use thiserror::Error;

/// Taxonomy from the ingestion error-handling design: every error a
/// downstream component raises falls into one of these buckets, which
/// drives retry/drop/dead-letter policy in the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Payload,
    Semantic,
    Resolution,
    PartialDownstream,
    Emission,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Payload => write!(f, "payload"),
            Self::Semantic => write!(f, "semantic"),
            Self::Resolution => write!(f, "resolution"),
            Self::PartialDownstream => write!(f, "partial_downstream"),
            Self::Emission => write!(f, "emission"),
        }
    }
}

/// Structured payload-classification errors (spec §4.3). Each variant is
/// non-fatal at the classifier boundary: the supervisor decides whether to
/// drop, clamp, or keep the record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8 JSON")]
    MalformedEncoding,

    #[error("topic {0} is not recognized by any vendor dispatch table")]
    UnknownTopic(String),

    #[error("discriminator field missing from payload")]
    MissingDiscriminator,

    #[error("unrecognized discriminator value: {0}")]
    UnknownDiscriminator(String),

    #[error("required field '{field}' missing or has the wrong type")]
    SchemaViolation { field: String },

    #[error("field '{field}' value {value} is out of the allowed range")]
    OutOfRange { field: String, value: String },

    #[error("effective_time outside the accepted window, clamped to received_time")]
    ClockSkewWarning,
}

impl PayloadError {
    /// Whether this error means the record must be dropped (vs. kept with a warning).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ClockSkewWarning)
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ClockSkewWarning => ErrorCategory::Semantic,
            Self::OutOfRange { .. } => ErrorCategory::Semantic,
            _ => ErrorCategory::Payload,
        }
    }
}

/// Top-level error type shared across the ingestion crates.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl IngestError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Payload(e) => e.category(),
            Self::Store(_) => ErrorCategory::Transport,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Json(_) => ErrorCategory::Payload,
            Self::Configuration(_) => ErrorCategory::Transport,
        }
    }

    /// Whether retrying the same operation might succeed (infrastructure
    /// blips) as opposed to a structural problem with the message itself.
    pub fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transport)
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_skew_is_not_fatal() {
        assert!(!PayloadError::ClockSkewWarning.is_fatal());
        assert!(
            PayloadError::OutOfRange {
                field: "systolic".into(),
                value: "500".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn categories_match_taxonomy() {
        assert_eq!(PayloadError::UnknownTopic("x".into()).category(), ErrorCategory::Payload);
        assert_eq!(PayloadError::ClockSkewWarning.category(), ErrorCategory::Semantic);
    }

    #[test]
    fn store_errors_are_transient() {
        let err = IngestError::Store("timeout".into());
        assert!(err.is_transient());
    }

    #[test]
    fn payload_errors_are_not_transient() {
        let err: IngestError = PayloadError::MissingDiscriminator.into();
        assert!(!err.is_transient());
    }
}
