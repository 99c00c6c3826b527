//! Dump configuration
//!
//! Loaded from an optional YAML file, then overridden by CLI flags:
//!
//! ```yaml
//! indent: "\t"
//! timestamps: true
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TraceError};

/// Indentation unit used when none is configured
pub const DEFAULT_INDENT: &str = " ";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Repeated once per depth level in front of every line
    pub indent: String,
    /// Prefix each line with `[<timestamp>] `
    pub timestamps: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT.to_string(),
            timestamps: false,
        }
    }
}

impl RenderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file is a valid, empty config
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| TraceError::Config {
            reason: e.to_string(),
        })
    }

    /// Apply CLI flags on top of the loaded values
    pub fn with_overrides(mut self, indent: Option<String>, timestamps: bool) -> Self {
        if let Some(indent) = indent {
            self.indent = indent;
        }
        if timestamps {
            self.timestamps = true;
        }
        self
    }
}
