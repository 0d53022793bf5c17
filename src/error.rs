use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid palette: {0}")]
    InvalidPalette(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No agents available")]
    NoAgents,

    #[error("Failed to acquire agent {id}: {reason}")]
    AgentAcquire {
        id: crate::agent::AgentId,
        reason: String,
    },

    #[error("Placement failed: {0}")]
    Placement(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Agent already exists: {id}")]
    AgentExists { id: crate::agent::AgentId },

    #[error("Agent not found: {id}")]
    AgentNotFound { id: crate::agent::AgentId },
}

pub type Result<T> = std::result::Result<T, Error>;
