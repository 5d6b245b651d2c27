use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadInput(String),
    #[error("{path} unavailable: {reason}")]
    UpstreamUnavailable { path: PathBuf, reason: String },
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput(message.into())
    }

    pub fn upstream(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
