use crate::error::{LrcError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrcEditConfig {
    #[serde(default)]
    pub document: DocumentOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What a document keeps when it is saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOptions {
    /// Write tags outside the reserved set
    #[serde(default = "default_true")]
    pub save_unknown_tags: bool,
    /// Write lyrics lines that have no timestamp (as `[]text`)
    #[serde(default)]
    pub save_lines_without_timestamp: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            save_unknown_tags: true,
            save_lines_without_timestamp: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file in the cache directory
    #[serde(default)]
    pub enabled: bool,
}

impl LrcEditConfig {
    /// Get the config file path (~/.config/lrcedit/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location or create a template on first run
    ///
    /// # Errors
    ///
    /// Returns [`LrcError::ConfigNotFound`] after writing the template, or an
    /// error if the config file cannot be read or parsed.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Same as [`LrcEditConfig::load_or_create`] for an explicit path
    ///
    /// # Errors
    ///
    /// Returns [`LrcError::ConfigNotFound`] after writing the template, or an
    /// error if the config file cannot be read or parsed.
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(LrcError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text; missing sections use defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this structure.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

const CONFIG_TEMPLATE: &str = r"# lrcedit configuration
# ~/.config/lrcedit/config.toml

[document]
# Keep tags other than ar, al, ti, au, length, offset, by, re, ve when saving
save_unknown_tags = true
# Keep lyrics lines without a timestamp when saving (written as []text)
save_lines_without_timestamp = false

[logging]
# Also write logs to ~/.cache/lrcedit/lrcedit.log
enabled = false
";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_matches_defaults() {
        let config = LrcEditConfig::from_toml_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, LrcEditConfig::default());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = LrcEditConfig::from_toml_str("[document]\nsave_unknown_tags = false\n").unwrap();
        assert!(!config.document.save_unknown_tags);
        assert!(!config.document.save_lines_without_timestamp);
        assert!(!config.logging.enabled);

        assert_eq!(
            LrcEditConfig::from_toml_str("").unwrap(),
            LrcEditConfig::default()
        );
    }

    #[test]
    fn test_parse_error() {
        let result = LrcEditConfig::from_toml_str("[document\nsave_unknown_tags = ");
        assert!(matches!(result, Err(LrcError::ConfigParse(_))));

        let result = LrcEditConfig::from_toml_str("[document]\nsave_unknown_tags = \"yes\"\n");
        assert!(matches!(result, Err(LrcError::ConfigParse(_))));
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let first = LrcEditConfig::load_or_create_at(&path);
        assert!(matches!(first, Err(LrcError::ConfigNotFound { .. })));
        assert!(path.exists());

        let second = LrcEditConfig::load_or_create_at(&path).unwrap();
        assert_eq!(second, LrcEditConfig::default());
    }
}
