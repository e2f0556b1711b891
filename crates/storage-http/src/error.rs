//! Error types for HTTP blob source operations.

use assetpack_storage::SourceError;
use thiserror::Error;

/// Errors specific to the HTTP blob source.
#[derive(Error, Debug)]
pub enum HttpSourceError {
    /// Transport error from the HTTP client.
    #[error("HTTP error for {location}: {message}")]
    Transport {
        location: String,
        message: String,
        retryable: bool,
    },

    /// Server answered with an unexpected status.
    #[error("HTTP {status} for {location}")]
    Status { location: String, status: u16 },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl HttpSourceError {
    /// Classify a `reqwest` error for `location`.
    pub fn transport(location: impl Into<String>, err: reqwest::Error) -> Self {
        HttpSourceError::Transport {
            location: location.into(),
            retryable: err.is_timeout() || err.is_connect(),
            message: err.to_string(),
        }
    }
}

impl From<HttpSourceError> for SourceError {
    fn from(err: HttpSourceError) -> Self {
        match err {
            HttpSourceError::Transport {
                location,
                message,
                retryable,
            } => SourceError::NetworkError {
                message: format!("{}: {}", location, message),
                retryable,
            },
            HttpSourceError::Status { location, status } if status == 404 => {
                SourceError::NotFound { location }
            }
            HttpSourceError::Status { location, status } => SourceError::NetworkError {
                message: format!("HTTP {} for {}", status, location),
                retryable: status >= 500 || status == 429,
            },
            HttpSourceError::ConfigError(message) => SourceError::InvalidConfig { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found: SourceError = HttpSourceError::Status {
            location: "u".into(),
            status: 404,
        }
        .into();
        assert!(matches!(not_found, SourceError::NotFound { .. }));

        let unavailable: SourceError = HttpSourceError::Status {
            location: "u".into(),
            status: 503,
        }
        .into();
        assert!(unavailable.is_retryable());

        let forbidden: SourceError = HttpSourceError::Status {
            location: "u".into(),
            status: 403,
        }
        .into();
        assert!(!forbidden.is_retryable());
    }
}
