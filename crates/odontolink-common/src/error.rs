use thiserror::Error;

/// Error taxonomy shared by every stage of the linker.
///
/// A lookup miss is not represented here: a mention without evidence simply
/// carries an empty candidate list.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Malformed token or record. Fatal for the line, never for the batch.
    #[error("Validation error on line {line_id}: {reason}")]
    Validation { line_id: String, reason: String },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Rescue validation failed for '{surface}': {reason}")]
    RescueValidation { surface: String, reason: String },

    #[error("Lexicon error: {0}")]
    Lexicon(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LinkError {
    pub fn validation(line_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            line_id: line_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is confined to a single line.
    pub fn is_line_local(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::RescueValidation { .. })
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
