//! Error types for the calendar engine.

use thiserror::Error;

/// Errors that can occur while answering a calendar query.
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event store error: {0}")]
    Store(String),

    #[error("Invalid latitude {0}: must be within [-90, 90]")]
    InvalidLatitude(f64),

    #[error("Invalid longitude {0}: must be within [-180, 180]")]
    InvalidLongitude(f64),

    #[error("Invalid radius '{0}'")]
    InvalidRadius(String),

    #[error("Invalid date '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CalendarError {
    /// True for the geo validation failures that degrade a query to non-geo.
    pub fn is_invalid_geo(&self) -> bool {
        matches!(
            self,
            CalendarError::InvalidLatitude(_)
                | CalendarError::InvalidLongitude(_)
                | CalendarError::InvalidRadius(_)
        )
    }
}

/// Result type alias for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;
