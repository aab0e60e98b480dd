//! Configuration module for script nodes
//!
//! This module handles:
//! - Node-wide settings stored as TOML ([`ScriptNodeSettings`])
//! - Persisted node state stored as JSON ([`NodeState`])
//!
//! # Config Location
//!
//! Settings are stored in the platform-appropriate config directory:
//! - **Linux**: `~/.config/dev.hxyulin.scriptnode/settings.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.scriptnode/settings.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.scriptnode\settings.toml`
//!
//! # Example
//!
//! ```ignore
//! use scriptnode::config::ScriptNodeSettings;
//!
//! let settings = ScriptNodeSettings::load_or_default();
//! let node = ScriptNode::with_settings(NodeId(0), "script", settings);
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ScriptError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.scriptnode";

/// Settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default settings file
pub fn default_settings_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

impl ScriptNodeSettings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::Config(format!("Failed to read settings {:?}: {}", path, e))
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| {
            ScriptError::Config(format!("Failed to parse settings {:?}: {}", path, e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save settings to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ScriptError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ScriptError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            ScriptError::Config(format!("Failed to write settings {:?}: {}", path, e))
        })
    }

    /// Reject values no node could run with
    pub fn validate(&self) -> Result<()> {
        if self.default_frame.is_empty() {
            return Err(ScriptError::Config("default_frame must not be empty".to_string()));
        }
        if self.logging.file_prefix.is_empty() {
            return Err(ScriptError::Config(
                "logging.file_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Node State ====================

/// Persisted state of a script node: its source text, and nothing else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub code: String,
}

impl NodeState {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScriptError::Serialization(format!("Failed to serialize node state: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ScriptError::Serialization(format!("Failed to parse node state: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut settings = ScriptNodeSettings::default();
        settings.default_frame = "/odom".to_string();
        settings.echo_script_output = false;
        settings.save(&path).unwrap();

        let loaded = ScriptNodeSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_rejects_invalid_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "default_frame = \"\"").unwrap();

        let err = ScriptNodeSettings::load(&path).unwrap_err();
        assert!(matches!(err, ScriptError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ScriptNodeSettings::load("/nonexistent/settings.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read settings"));
    }

    #[test]
    fn test_node_state_json() {
        let state = NodeState::new("fn tick() {}");
        let json = state.to_json().unwrap();
        assert!(json.contains("\"code\""));
        assert_eq!(NodeState::from_json(&json).unwrap(), state);

        assert!(NodeState::from_json("{\"source\": 1}").is_err());
    }
}
