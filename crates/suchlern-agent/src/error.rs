use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Value table serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Value table write failed: {0}")]
    Persist(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
