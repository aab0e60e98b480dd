//! Settings for script nodes
//!
//! # Main Types
//!
//! - [`ScriptNodeSettings`] - Defaults applied to every script node
//! - [`LogSettings`] - Log filter and optional log file location
//!
//! All fields have defaults, so a settings file only needs the keys it
//! changes:
//!
//! ```toml
//! default_frame = "/base_link"
//! echo_script_output = false
//!
//! [logging]
//! filter = "warn,script=info"
//! directory = "/var/log/scriptnode"
//! ```

use crate::pipeline::message::DEFAULT_FRAME;
use crate::scripting::templates;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Defaults applied to every script node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptNodeSettings {
    /// Frame tag attached by `write(h, value)` when the script names none
    pub default_frame: String,

    /// Log script `print` output at info level (debug level otherwise)
    pub echo_script_output: bool,

    /// Code given to freshly created nodes
    pub default_code: String,

    /// Logging configuration
    pub logging: LogSettings,
}

impl Default for ScriptNodeSettings {
    fn default() -> Self {
        Self {
            default_frame: DEFAULT_FRAME.to_string(),
            echo_script_output: true,
            default_code: templates::DEFAULT_CODE.to_string(),
            logging: LogSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set
    pub filter: String,

    /// Directory for daily rolling log files; console only when unset
    pub directory: Option<PathBuf>,

    /// File name prefix for rolling log files
    pub file_prefix: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info,scriptnode=debug".to_string(),
            directory: None,
            file_prefix: "scriptnode.log".to_string(),
        }
    }
}
