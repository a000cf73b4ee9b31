use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("cannot load encoder weights: {0}")]
    ModelLoad(String),

    #[error("encoder tokenizer failed: {0}")]
    Tokenizer(String),

    #[error("encoding failed: {0}")]
    Inference(String),

    #[error("cannot fetch encoder files: {0}")]
    Download(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("vector index corrupt: {0}")]
    IndexFormat(String),

    /// Index rows and query vectors disagree in width.
    #[error("index rows have {index} dims but the encoder emits {encoder}")]
    DimensionMismatch { index: usize, encoder: usize },

    #[error("no encoder named '{0}'")]
    UnknownEncoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<EmbedError> for odontolink_common::LinkError {
    fn from(e: EmbedError) -> Self {
        use odontolink_common::LinkError;
        match e {
            EmbedError::IndexUnavailable(msg) => LinkError::IndexUnavailable(msg),
            other => LinkError::Embedding(other.to_string()),
        }
    }
}

#[cfg(feature = "bert")]
mod backend_errors {
    use super::EmbedError;

    impl From<candle_core::Error> for EmbedError {
        fn from(e: candle_core::Error) -> Self {
            Self::Inference(e.to_string())
        }
    }

    impl From<tokenizers::Error> for EmbedError {
        fn from(e: tokenizers::Error) -> Self {
            Self::Tokenizer(e.to_string())
        }
    }

    impl From<hf_hub::api::sync::ApiError> for EmbedError {
        fn from(e: hf_hub::api::sync::ApiError) -> Self {
            Self::Download(e.to_string())
        }
    }
}
