//! Engine options
//!
//! Options are read from `lantern.toml` or from the `[tool.lantern]` table of `pyproject.toml`.
//! Every field has a default, so a file only needs to name what it changes.

use lantern_core::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Number of propagation passes over every module, function and lambda
    pub passes: usize,
    /// Record capabilities on the final pass and refine ambiguous unions afterwards
    pub use_capabilities: bool,
    /// Mark names bound by plain imports as private to the importing module
    pub private_imports: bool,
    /// Extra roots searched by absolute imports
    pub python_paths: Vec<PathBuf>,
    /// Longest string literal that `eval` will analyze
    pub max_eval_len: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options { passes: 3, use_capabilities: true, private_imports: false, python_paths: Vec::new(), max_eval_len: 10000 }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if self.passes == 0 {
            return Err(ConfigError::InvalidOption { name: "passes", reason: "must be at least 1".to_string() }.into());
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let options: Options = toml::from_str(content).map_err(ConfigError::TOMLError)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    /// Discover and load options for a project rooted at `root`
    ///
    /// Searches in order:
    /// 1. `lantern.toml`
    /// 2. `[tool.lantern]` section in `pyproject.toml`
    pub fn discover_and_load(root: &Path) -> Result<Self> {
        let lantern_toml = root.join("lantern.toml");
        if lantern_toml.exists() {
            tracing::info!("Loading options from {}", lantern_toml.display());
            return Self::load(&lantern_toml);
        }

        let pyproject_toml = root.join("pyproject.toml");
        if pyproject_toml.exists() {
            let content = fs::read_to_string(&pyproject_toml)
                .map_err(|source| ConfigError::Io { path: pyproject_toml.clone(), source })?;
            let table: toml::Table = toml::from_str(&content).map_err(ConfigError::TOMLError)?;
            if let Some(section) = table.get("tool").and_then(|t| t.as_table()).and_then(|t| t.get("lantern")) {
                tracing::info!("Loading options from [tool.lantern] in {}", pyproject_toml.display());
                let options: Options = section.clone().try_into().map_err(ConfigError::TOMLError)?;
                options.validate()?;
                return Ok(options);
            }
        }

        tracing::debug!("No lantern.toml or [tool.lantern] found, using defaults");
        Ok(Options::default())
    }
}
