// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for Airwave.
//!
//! Every fallible operation in the relay, the registry and the background
//! scheduler reports one of these variants. None of them is fatal: the server
//! turns them into an `error` message on the duplex channel or an HTTP error
//! response.

use thiserror::Error;

/// Main error type for Airwave operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AirwaveError {
    /// An unknown stream or track identifier.
    #[error("{0} not found")]
    NotFound(String),

    /// A listener asked to join but nobody is broadcasting.
    #[error("No active streams available")]
    NoActiveStreams,

    /// A producer tried to start a second broadcast, or a stream id was
    /// registered twice.
    #[error("Already live: {0}")]
    AlreadyLive(String),

    /// The stream id has been retired and can never go live again.
    #[error("Stream {0} has already ended")]
    AlreadyEnded(String),

    /// Malformed input that could not be clamped into range.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The catalog gateway failed.
    ///
    /// The operation is aborted and prior state is preserved; the periodic
    /// self-heal check retries later.
    #[error("Catalog error: {0}")]
    Upstream(String),
}

/// Convenience type alias for Results using `AirwaveError`.
pub type Result<T> = std::result::Result<T, AirwaveError>;

impl From<AirwaveError> for String {
    fn from(err: AirwaveError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AirwaveError::NotFound("Track 7".to_string());
        assert_eq!(err.to_string(), "Track 7 not found");

        assert_eq!(AirwaveError::NoActiveStreams.to_string(), "No active streams available");

        let err = AirwaveError::Upstream("connection refused".to_string());
        assert_eq!(err.to_string(), "Catalog error: connection refused");
    }

    #[test]
    fn test_error_to_string_conversion() {
        let err = AirwaveError::Validation("track_id must be positive".to_string());
        let s: String = err.into();
        assert_eq!(s, "Validation error: track_id must be positive");
    }
}
