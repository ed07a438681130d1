use chrono::{DateTime, Utc};
use thiserror::Error;

/// How the trading loop reacts to an error raised inside a tick or during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup cannot continue, the engine moves to `Failed`. Inside a tick it
    /// is only reported.
    Fatal,
    /// Nothing to act on this tick, try again on the next one.
    SkipTick,
    /// Reported to the observer, the tick carries on.
    Recoverable,
}

/// Typed error hierarchy for the trading engine.
#[derive(Error, Debug)]
pub enum TraderError {
    // -- Broker session -----------------------------------------------------
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("failed to fetch bars: {0}")]
    Fetch(String),

    #[error("account query failed: {0}")]
    Query(String),

    #[error("order failed: {0}")]
    Order(String),

    // -- Market data --------------------------------------------------------
    #[error("bar at {timestamp} does not extend latest bar at {latest}")]
    DataGap {
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    // -- Predictor ----------------------------------------------------------
    #[error("insufficient data: {available} available, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("predictor has not been fitted yet")]
    NotFitted,

    #[error("model error: {0}")]
    Model(String),

    // -- Position ledger ----------------------------------------------------
    #[error("a position is already open (order {0})")]
    PositionAlreadyOpen(u64),

    #[error("no open position")]
    NoOpenPosition,

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Settings(#[from] config::ConfigError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TraderError::Auth(_)
            | TraderError::Fetch(_)
            | TraderError::Config(_)
            | TraderError::Settings(_)
            | TraderError::Model(_) => ErrorKind::Fatal,
            TraderError::InsufficientData { .. } | TraderError::NotFitted => ErrorKind::SkipTick,
            TraderError::Query(_)
            | TraderError::Order(_)
            | TraderError::DataGap { .. }
            | TraderError::PositionAlreadyOpen(_)
            | TraderError::NoOpenPosition
            | TraderError::Csv(_)
            | TraderError::Io(_) => ErrorKind::Recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(TraderError::Auth("bad".into()).kind(), ErrorKind::Fatal);
        assert_eq!(TraderError::Fetch("empty".into()).kind(), ErrorKind::Fatal);
        assert_eq!(TraderError::NotFitted.kind(), ErrorKind::SkipTick);
        assert_eq!(
            TraderError::InsufficientData {
                available: 1,
                required: 2
            }
            .kind(),
            ErrorKind::SkipTick
        );
        assert_eq!(TraderError::Order("rejected".into()).kind(), ErrorKind::Recoverable);
        assert_eq!(TraderError::NoOpenPosition.kind(), ErrorKind::Recoverable);
    }

    #[test]
    fn test_error_messages() {
        let err = TraderError::InsufficientData {
            available: 3,
            required: 50,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data: 3 available, 50 required"
        );
        assert_eq!(
            TraderError::PositionAlreadyOpen(7).to_string(),
            "a position is already open (order 7)"
        );
    }
}
