//! Configuration: TOML file with defaults for every field
//!
//! ```toml
//! [compiler]
//! policy = "strict"            # or "permissive"
//! default_filename = "Dashboard.dash"
//!
//! [sandbox]
//! max_instructions = 10000
//! max_depth = 64
//!
//! [store]
//! root = "dashboards"
//!
//! [data]
//! query_file = "Overview.sql"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::policy::ScriptPolicy;
use crate::sandbox::SandboxLimits;
use crate::{Error, Result};

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "dashc.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub compiler: CompilerConfig,
    pub sandbox: SandboxLimits,
    pub store: StoreConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CompilerConfig {
    pub policy: ScriptPolicy,
    pub default_filename: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            policy: ScriptPolicy::Strict,
            default_filename: "Dashboard.dash".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            root: PathBuf::from("dashboards"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DataConfig {
    /// Companion file holding `--name` query blocks, per document directory
    pub query_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            query_file: "Overview.sql".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// `Error::Config` for invalid TOML, unknown keys, or invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, else `dashc.toml` in `dir` if present, else defaults
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "using discovered config");
            return Self::load(&candidate);
        }
        Ok(Config::default())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.sandbox.max_instructions == 0 {
            return Err(Error::Config(
                "sandbox.max_instructions must be greater than 0".to_string(),
            ));
        }
        if self.sandbox.max_depth == 0 {
            return Err(Error::Config("sandbox.max_depth must be greater than 0".to_string()));
        }
        if self.compiler.default_filename.trim().is_empty() {
            return Err(Error::Config(
                "compiler.default_filename must not be empty".to_string(),
            ));
        }
        let query_file = &self.data.query_file;
        if query_file.is_empty() || query_file.contains(['/', '\\']) || query_file.starts_with('.') {
            return Err(Error::Config(format!(
                "data.query_file must be a plain file name, got '{}'",
                query_file
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.compiler.policy, ScriptPolicy::Strict);
        assert_eq!(config.sandbox.max_instructions, 10_000);
        assert_eq!(config.store.root, PathBuf::from("dashboards"));
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            "[compiler]\npolicy = \"permissive\"\n\n[sandbox]\nmax_depth = 8\n",
        )
        .unwrap();
        assert_eq!(config.compiler.policy, ScriptPolicy::Permissive);
        assert_eq!(config.compiler.default_filename, "Dashboard.dash");
        assert_eq!(config.sandbox.max_depth, 8);
        assert_eq!(config.sandbox.max_instructions, 10_000);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml_str("[compiler]\nmode = \"fast\"\n").unwrap_err();
        assert_eq!(err.category(), "ConfigError");
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(Config::from_toml_str("[compiler]\npolicy = \"open\"\n").is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = Config::from_toml_str("[sandbox]\nmax_instructions = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_instructions"));
    }

    #[test]
    fn test_query_file_must_be_plain_name() {
        for bad in ["", "../secrets.sql", "sub/Q.sql", ".hidden"] {
            let text = format!("[data]\nquery_file = \"{}\"\n", bad);
            assert!(Config::from_toml_str(&text).is_err(), "{}", bad);
        }
        assert!(Config::from_toml_str("[data]\nquery_file = \"Q.sql\"\n").is_ok());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_discover_prefers_explicit_then_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::discover(None, dir.path()).unwrap(), Config::default());

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[store]\nroot = \"boards\"\n").unwrap();
        let found = Config::discover(None, dir.path()).unwrap();
        assert_eq!(found.store.root, PathBuf::from("boards"));

        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "[data]\nquery_file = \"Q.sql\"\n").unwrap();
        let loaded = Config::discover(Some(&explicit), dir.path()).unwrap();
        assert_eq!(loaded.data.query_file, "Q.sql");
        assert_eq!(loaded.store.root, PathBuf::from("dashboards"));
    }
}
