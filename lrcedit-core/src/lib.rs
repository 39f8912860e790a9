pub mod config;
pub mod error;
pub mod flags;
pub mod lrc;
pub mod paths;
pub mod timestamp;

pub use config::{DocumentOptions, LoggingConfig, LrcEditConfig};
pub use error::{LrcError, Result};
pub use flags::ErrorFlags;
pub use lrc::{check_timestamps, LrcDocument, LyricsLine, TagKey, TagValue};
pub use paths::{config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use timestamp::{Timestamp, TimestampError, DEFAULT_PRECISION, MAX_PRECISION};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
