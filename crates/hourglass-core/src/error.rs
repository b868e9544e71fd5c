use thiserror::Error;

#[derive(Debug, Error)]
pub enum HourglassError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Invalid group pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl HourglassError {
    /// Short, stable error code for callers that branch on the kind of failure.
    pub fn code(&self) -> &'static str {
        match self {
            HourglassError::Config(_) => "CONFIG_ERROR",
            HourglassError::InvalidKey { .. } => "INVALID_KEY",
            HourglassError::InvalidPattern(_) => "INVALID_PATTERN",
        }
    }
}

pub type Result<T> = std::result::Result<T, HourglassError>;
