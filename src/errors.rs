use axum::http::StatusCode;
use thiserror::Error;

/// Failures of the meal analysis pipeline. Unreadable model output is not an
/// error; the parser turns it into a fallback record.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required setting (the model API key) is missing.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The model call itself failed; the cause chain is kept.
    #[error("vision model call failed: {0:#}")]
    Invocation(anyhow::Error),
}

impl AnalysisError {
    pub fn status(&self) -> StatusCode {
        match self {
            AnalysisError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AnalysisError::Invocation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
