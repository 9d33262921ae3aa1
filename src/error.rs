//! Error types for the engine and the HTTP surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Reference table could not be read or parsed. Fatal at startup.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Malformed reference table at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Failed to read reference table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch reference table: {0}")]
    Fetch(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl TableError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        TableError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// Matching failed. Only raised when there is nothing to match against.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    #[error("No reference data loaded")]
    NoReferenceData,
}

/// Invalid environment configuration
#[derive(Error, Debug, PartialEq)]
#[error("Invalid value for {var}: {value:?} ({reason})")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown notation: {0}")]
    UnknownNotation(String),

    #[error("No image loaded")]
    NoImage,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::UnknownNotation(_) | AppError::NoImage => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::Match(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::ImageProcessing(_) | AppError::Export(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::InvalidInput("r".into()), StatusCode::BAD_REQUEST),
            (AppError::NoImage, StatusCode::NOT_FOUND),
            (AppError::UnknownNotation("5Q 4/6".into()), StatusCode::NOT_FOUND),
            (AppError::Match(MatchError::NoReferenceData), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Export("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_malformed_message_names_line() {
        let err = TableError::malformed(12, "chroma is negative");
        assert_eq!(
            err.to_string(),
            "Malformed reference table at line 12: chroma is negative"
        );
    }
}
