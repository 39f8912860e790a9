use crate::flags::ErrorFlags;
use crate::timestamp::TimestampError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LrcError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - edit it and run again.")]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Data errors
    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("Lyrics rejected: {}", describe(*flags))]
    Validation { flags: ErrorFlags },

    #[error("Tag '{tag}' has no duplicate values to resolve")]
    NotDuplicate { tag: String },

    // Caller errors
    #[error("Invalid usage: {reason}")]
    InvalidUsage { reason: String },

    #[error("Document has no backing file; use save_to")]
    NoPath,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to replace file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

fn describe(flags: ErrorFlags) -> String {
    flags
        .messages()
        .map(|(_, message)| message)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, LrcError>;
