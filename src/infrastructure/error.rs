use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
