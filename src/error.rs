use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input directory for {kind} series is not usable: {path}")]
    InputDir { kind: String, path: String },

    #[error("Output store for {kind} series could not be initialized: {message}")]
    StoreInit { kind: String, message: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;
