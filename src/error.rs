//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror. Every
//! variant maps to a stable machine-readable code via [`Error::code`] so an
//! HTTP-facing adapter can pick a status without inspecting error internals.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient credits for tenant {0}")]
    InsufficientCredits(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider error: {0}")]
    ProviderFailed(String),

    #[error("Provider no longer knows job: {0}")]
    ProviderTimeout(String),

    #[error("All storage backends failed: {}", format_backend_errors(.0))]
    StorageFailed(Vec<(String, String)>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for this error, suitable for wire use.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::InsufficientCredits(_) => "INSUFFICIENT_CREDITS",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::ProviderFailed(_) => "PROVIDER_FAILED",
            Error::ProviderTimeout(_) => "PROVIDER_TIMEOUT",
            Error::StorageFailed(_) => "STORAGE_FAILED",
            _ => "INTERNAL",
        }
    }
}

fn format_backend_errors(errors: &[(String, String)]) -> String {
    errors
        .iter()
        .map(|(backend, err)| format!("{}: {}", backend, err))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::Unauthorized("x".into()).code(), "UNAUTHORIZED");
        assert_eq!(
            Error::InsufficientCredits("t".into()).code(),
            "INSUFFICIENT_CREDITS"
        );
        assert_eq!(Error::ProviderFailed("x".into()).code(), "PROVIDER_FAILED");
        assert_eq!(Error::ProviderTimeout("x".into()).code(), "PROVIDER_TIMEOUT");
        assert_eq!(Error::StorageFailed(vec![]).code(), "STORAGE_FAILED");
        assert_eq!(Error::Internal("x".into()).code(), "INTERNAL");
    }

    #[test]
    fn test_storage_failed_lists_every_backend() {
        let err = Error::StorageFailed(vec![
            ("spaces".to_string(), "timeout".to_string()),
            ("disk".to_string(), "permission denied".to_string()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("spaces: timeout"));
        assert!(msg.contains("disk: permission denied"));
    }
}
