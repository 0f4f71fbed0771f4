use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Order API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No snapshot available for {0}")]
    NoSnapshot(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for upstream rate limiting (HTTP 429).
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status == 429,
            Error::Http(e) => e.status().map(|s| s.as_u16()) == Some(429),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_detection() {
        let e = Error::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert!(e.is_rate_limited());

        let e = Error::Api {
            status: 500,
            message: "boom".into(),
        };
        assert!(!e.is_rate_limited());
        assert!(!Error::Other("x".into()).is_rate_limited());
    }

    #[test]
    fn test_display() {
        let e = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(e.to_string(), "Order API returned 503: unavailable");
    }
}
