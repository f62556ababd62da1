use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "PYOP_CONFIG";

/// When the embedded runtime is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownPolicy {
    /// Only an explicit shutdown finalizes the runtime.
    #[default]
    OnShutdown,
    /// The last owner to release the runtime finalizes it.
    OnLastRelease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directories prepended to the interpreter's module search path.
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,
    #[serde(default)]
    pub teardown: TeardownPolicy,
}

fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            teardown: TeardownPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    runtime: RuntimeConfig,
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, RuntimeError> {
        let file: SettingsFile = toml::from_str(content)
            .map_err(|e| RuntimeError::Config(format!("failed to parse settings: {e}")))?;
        Ok(file.runtime)
    }

    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// `<config_dir>/pyop/pyop.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pyop").join("pyop.toml"))
    }

    /// Loads settings from `$PYOP_CONFIG`, else the default path if present,
    /// else falls back to defaults.
    pub fn discover() -> Result<Self, RuntimeError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(path);
            tracing::debug!(path = %path.display(), "Loading runtime settings from {CONFIG_ENV}");
            return Self::from_file(&path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading runtime settings");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}
