use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Provisioning configuration (TOML on disk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Base URL of the privileged installer agent
    pub agent_url: String,
    /// Base URL of the Ollama HTTP API, port included
    pub runtime_url: String,
    pub request_timeout_secs: u64,
    /// Ask the agent to reinstall even when a runtime is present
    pub force_install: bool,
    /// Delay between synthetic progress increments; 0 disables pacing
    pub step_delay_ms: u64,
    /// Pulled and smoke-tested after a successful install
    pub default_model: Option<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            agent_url: "http://127.0.0.1:8765".to_string(),
            runtime_url: "http://127.0.0.1:11434".to_string(),
            request_timeout_secs: 30,
            force_install: false,
            step_delay_ms: 150,
            default_model: None,
        }
    }
}

impl ProvisionConfig {
    /// `<config dir>/rtprovision/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("rtprovision")
            .join("config.toml"))
    }

    /// Load `path`, writing the defaults there first if it does not exist
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config not found at {}, creating default configuration",
                path.display()
            );

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }

            let default_toml = toml::to_string_pretty(&Self::default())
                .context("Failed to serialize default config")?;
            fs::write(path, default_toml).context("Failed to write config file")?;
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        log::debug!("Using config from: {}", path.display());
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = ProvisionConfig::load_or_init(&path).unwrap();

        assert_eq!(cfg, ProvisionConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_model = \"llama3.2\"\nstep_delay_ms = 0\n").unwrap();

        let cfg = ProvisionConfig::load_or_init(&path).unwrap();

        assert_eq!(cfg.default_model.as_deref(), Some("llama3.2"));
        assert_eq!(cfg.step_delay_ms, 0);
        assert_eq!(cfg.runtime_url, "http://127.0.0.1:11434");
    }

    #[test]
    fn runtime_address_comes_from_runtime_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        // Older files may still carry a separate port key; it has no effect.
        fs::write(
            &path,
            "runtime_url = \"http://10.0.0.5:8080\"\nruntime_port = 9999\n",
        )
        .unwrap();

        let cfg = ProvisionConfig::load_or_init(&path).unwrap();

        assert_eq!(cfg.runtime_url, "http://10.0.0.5:8080");
        let written = toml::to_string_pretty(&ProvisionConfig::default()).unwrap();
        assert!(!written.contains("runtime_port"));
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "agent_url = [").unwrap();

        let err = ProvisionConfig::load_or_init(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }
}
