use thiserror::Error;

#[derive(Debug, Error)]
pub enum UscanError {
    #[error("Malformed deal: {field} — {reason}")]
    MalformedDeal { field: String, reason: String },

    #[error("Invalid correlation matrix: {0}")]
    InvalidCorrelation(String),

    #[error("Dimension mismatch: correlation matrix has dimension {found}, expected {expected} (one per underlying)")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl UscanError {
    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        UscanError::MalformedDeal {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for UscanError {
    fn from(e: serde_json::Error) -> Self {
        UscanError::SerializationError(e.to_string())
    }
}
