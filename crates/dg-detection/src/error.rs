//! Error types for doppelganger detection

use crate::domain::types::Epoch;
use thiserror::Error;

/// Errors surfaced by [`crate::DoppelgangerApi`]
///
/// None of these may be interpreted as permission to start a validator client.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Invalid setting, fatal at startup
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Missing or empty validator list; no state is touched
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A lookup the evaluation cannot proceed without failed
    #[error("Beacon node unavailable: {0}")]
    UpstreamUnavailable(#[from] BeaconError),

    /// Safe-epoch gate has not passed yet; retry later
    #[error(
        "Not enough epochs elapsed: check started at epoch {check_started}, \
         safe from epoch {safe_epoch}, current epoch {current_epoch}"
    )]
    CooldownNotElapsed {
        check_started: Epoch,
        safe_epoch: Epoch,
        current_epoch: Epoch,
    },

    /// Too many duties could not be resolved to tell absence from outage
    #[error("Insufficient data: not-found ratio {not_found_ratio:.2} exceeds {threshold:.2}")]
    DataUnavailable { not_found_ratio: f64, threshold: f64 },

    /// The window contained no duty that could be evaluated
    #[error("No attester duties evaluated between epochs {from} and {to}")]
    NoDutiesEvaluated { from: Epoch, to: Epoch },

    /// State read or write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl DetectionError {
    /// Caller should poll again later; nothing is wrong with the request.
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            Self::CooldownNotElapsed { .. }
                | Self::DataUnavailable { .. }
                | Self::NoDutiesEvaluated { .. }
        )
    }

    /// Failure caused by an external dependency rather than the input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::Persistence(_))
    }
}

/// Beacon node request failures
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("Invalid beacon node URL: {0}")]
    Url(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected status {status} from {path}")]
    Status { status: u16, path: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BeaconError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                path: e.url().map(|u| u.path().to_string()).unwrap_or_default(),
            }
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// State store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Corrupt record for validator {validator_index}: {reason}")]
    Corrupt { validator_index: u64, reason: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type for detection operations
pub type DetectionResult<T> = Result<T, DetectionError>;

/// Result type for beacon node calls
pub type BeaconResult<T> = Result<T, BeaconError>;

/// Result type for state store calls
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconclusive_classification() {
        let cooldown = DetectionError::CooldownNotElapsed {
            check_started: 10,
            safe_epoch: 12,
            current_epoch: 11,
        };
        assert!(cooldown.is_inconclusive());
        assert!(!cooldown.is_transient());

        let ratio = DetectionError::DataUnavailable {
            not_found_ratio: 0.5,
            threshold: 0.3,
        };
        assert!(ratio.is_inconclusive());

        let upstream = DetectionError::from(BeaconError::Timeout);
        assert!(!upstream.is_inconclusive());
        assert!(upstream.is_transient());

        let input = DetectionError::InvalidInput {
            reason: "empty".into(),
        };
        assert!(!input.is_inconclusive());
        assert!(!input.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = DetectionError::DataUnavailable {
            not_found_ratio: 0.5,
            threshold: 0.3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: not-found ratio 0.50 exceeds 0.30"
        );
    }
}
