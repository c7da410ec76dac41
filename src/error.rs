use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Malformed stored document: {0}")]
    MalformedDocument(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type ProfilingResult<T> = Result<T, ProfilingError>;
