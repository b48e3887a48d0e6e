use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Extraction error: {strategy}: {message}")]
    Extraction { strategy: String, message: String },

    #[error("Push error: {0}")]
    Push(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wraps a browser-side failure with the action that was being attempted.
    pub fn browser<E: std::fmt::Display>(action: &str, err: E) -> Self {
        AppError::Browser(format!("{}: {}", action, err))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
