//! Error types for the adaptive EQ

use thiserror::Error;

/// Core error type
///
/// Configuration and contract errors surface immediately. Numerical trouble
/// inside the psychoacoustic path uses [`EqError::Fft`] or
/// [`EqError::NumericalFailure`] and is recovered by the caller's fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EqError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Band count mismatch: expected {expected}, got {got}")]
    BandMismatch { expected: usize, got: usize },

    #[error("Invalid channel layout: {0}")]
    ChannelLayout(String),

    #[error("Invalid band map: {0}")]
    BandMap(String),

    #[error("FFT error: {0}")]
    Fft(String),

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EqError {
    /// True for chunk-local numerical problems that a fallback path may absorb
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EqError::Fft(_) | EqError::NumericalFailure(_))
    }
}

impl From<serde_json::Error> for EqError {
    fn from(err: serde_json::Error) -> Self {
        EqError::Serialization(err.to_string())
    }
}

/// Result type alias
pub type EqResult<T> = Result<T, EqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        assert!(EqError::Fft("planner".into()).is_recoverable());
        assert!(EqError::NumericalFailure("nan".into()).is_recoverable());
        assert!(!EqError::BandMismatch { expected: 25, got: 3 }.is_recoverable());
        assert!(!EqError::InvalidConfig("fft".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = EqError::BandMismatch { expected: 25, got: 24 };
        assert_eq!(err.to_string(), "Band count mismatch: expected 25, got 24");
    }
}
