//! Script-file node constructors.
//!
//! A constructor describes one script file offered as a node type: its
//! display name, description, icon and tags. Locating script files and
//! reading manifests is left to the host; this only turns a described file
//! into a loaded node.

use crate::config::ScriptNodeSettings;
use crate::error::{Result, ResultExt, ScriptError};
use crate::pipeline::id::NodeId;
use crate::pipeline::nodes::ScriptNode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tag carried by every script node type.
pub const SCRIPT_TAG: &str = "Script";

/// Describes a node type backed by a script file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConstructor {
    /// Display name, also used as the node name.
    pub name: String,
    pub description: String,
    pub icon: String,
    /// Always contains [`SCRIPT_TAG`].
    pub tags: Vec<String>,
    /// Path of the script source.
    pub source: PathBuf,
}

impl NodeConstructor {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            tags: vec![SCRIPT_TAG.to_string()],
            source: source.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Add tags. The script tag is kept once regardless.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Read the script file and build a node running it with default settings.
    pub fn construct(&self, id: NodeId) -> Result<ScriptNode> {
        self.construct_with(id, ScriptNodeSettings::default())
    }

    /// Read the script file and build a node running it.
    ///
    /// The node is loaded once here so load failures are reported right away;
    /// only an unreadable file or an unavailable interpreter is an error.
    pub fn construct_with(&self, id: NodeId, settings: ScriptNodeSettings) -> Result<ScriptNode> {
        let code = std::fs::read_to_string(&self.source)
            .map_err(ScriptError::from)
            .with_context(|| format!("Failed to read script for '{}' from {:?}", self.name, self.source))?;

        let mut node = ScriptNode::with_settings(id, self.name.clone(), settings).with_code(code);
        node.reload()
            .with_context(|| format!("Failed to load script node '{}'", self.name))?;

        tracing::debug!("Constructed script node '{}' ({}) from {:?}", self.name, id, self.source);
        Ok(node)
    }
}

impl std::fmt::Display for NodeConstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_script_tag_always_present() {
        let ctor = NodeConstructor::new("Relay", "relay.rhai").with_tags(["Script", "Util"]);
        assert_eq!(ctor.tags, vec!["Script".to_string(), "Util".to_string()]);
    }

    #[test]
    fn test_construct_loads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "fn tick() {{}}").unwrap();

        let ctor = NodeConstructor::new("Ticker", file.path())
            .with_description("Ticks")
            .with_icon("clock");
        let node = ctor.construct(NodeId(4)).unwrap();

        assert!(node.is_ready());
        assert!(node.hooks().is_defined(crate::scripting::Hook::Tick));
        assert_eq!(node.code().trim(), "fn tick() {}");
    }

    #[test]
    fn test_construct_missing_file() {
        let ctor = NodeConstructor::new("Missing", "/nonexistent/script.rhai");
        let err = ctor.construct(NodeId(4)).unwrap_err();
        assert!(err.to_string().contains("Missing"));
        assert!(!err.is_fatal());
    }
}
