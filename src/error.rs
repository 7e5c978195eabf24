//! Unified error hierarchy for VeloScore
//!
//! Scoring failures are first-class outcomes, not panics: a missing HRV
//! reading, a provider timeout, or a gap in the load chain each map to a
//! distinct variant so callers can decide between retrying, degrading
//! confidence, or leaving the day untouched.

use chrono::NaiveDate;
use thiserror::Error;

use crate::store::StoreError;

/// Top-level error type for all VeloScore operations
#[derive(Debug, Error)]
pub enum VeloError {
    /// Required input absent or a baseline window under its minimum.
    /// Surfaced to the caller, never coerced into a default score.
    #[error("Insufficient data for {what}: {reason}")]
    InsufficientData { what: String, reason: String },

    /// Scoring was attempted before every required fetch resolved.
    /// Retryable: the day is rescored when the missing input arrives.
    #[error("Inputs for {date} not yet complete")]
    StaleInputRace { date: NaiveDate },

    /// A provider failed or timed out. The priority chain recovers by
    /// falling through; if every source fails the day is left untouched.
    #[error("Source {provider} unavailable: {reason}")]
    SourceUnavailable { provider: String, reason: String },

    /// The load chain is missing the prior day. Recovery is continuing
    /// the recurrence with TSS=0 for the gap.
    #[error("Load chain gap at {date}")]
    SequenceGap { date: NaiveDate },

    /// Overlapping illness and alcohol signatures that cannot be told
    /// apart from the available signals.
    #[error("Ambiguous physiological signal: {detail}")]
    AmbiguousSignal { detail: String },

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for VeloScore operations
pub type Result<T> = std::result::Result<T, VeloError>;

impl VeloError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VeloError::StaleInputRace { .. }
                | VeloError::SourceUnavailable { .. }
                | VeloError::Store(StoreError::Sqlite(_))
                | VeloError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            VeloError::InsufficientData { .. } => ErrorSeverity::Warning,
            VeloError::StaleInputRace { .. } => ErrorSeverity::Warning,
            VeloError::SourceUnavailable { .. } => ErrorSeverity::Warning,
            VeloError::SequenceGap { .. } => ErrorSeverity::Warning,
            VeloError::AmbiguousSignal { .. } => ErrorSeverity::Warning,
            VeloError::Validation(_) => ErrorSeverity::Warning,
            VeloError::Store(StoreError::NotFound(_)) => ErrorSeverity::Warning,
            VeloError::Store(_) => ErrorSeverity::Error,
            VeloError::Config(_) => ErrorSeverity::Error,
            VeloError::Io(_) => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            VeloError::InsufficientData { what, .. } => {
                format!(
                    "Not enough data to compute {}. Wear your device tonight and the score will return.",
                    what
                )
            }
            VeloError::StaleInputRace { date } => {
                format!(
                    "Data for {} is still syncing. The score will be computed once all sources report.",
                    date
                )
            }
            VeloError::SourceUnavailable { provider, .. } => {
                format!("Could not reach {}. Falling back to other sources.", provider)
            }
            VeloError::Store(StoreError::Sqlite(_)) => {
                "Unable to open the local score database. Please check your configuration.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = VeloError::InsufficientData {
            what: "recovery".to_string(),
            reason: "no HRV reading".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = VeloError::Config("bad weights".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_error_retryable() {
        let err = VeloError::StaleInputRace {
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        };
        assert!(err.is_retryable());

        let err = VeloError::Validation("test".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = VeloError::InsufficientData {
            what: "recovery".to_string(),
            reason: "no HRV".to_string(),
        };
        assert!(err.user_message().contains("Not enough data"));

        let err = VeloError::SourceUnavailable {
            provider: "intervals".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(err.user_message().contains("intervals"));
    }
}
