use thiserror::Error;

#[derive(Error, Debug)]
pub enum HatchwayError {
    #[error("No route matched path: {0}")]
    RouteNotFound(String),

    #[error("Backend request failed: {0}")]
    Backend(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State template corrupted: {0}")]
    TemplateCorrupted(String),
}

pub type Result<T> = std::result::Result<T, HatchwayError>;
