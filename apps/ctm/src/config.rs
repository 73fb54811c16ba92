//! CLI configuration.
//!
//! Stored as TOML:
//! - Linux: `$XDG_CONFIG_HOME/content-transfer/ctm.toml`
//!   (falling back to `~/.config`)
//! - Windows: `%APPDATA%/content-transfer/ctm.toml`

use std::path::{Path, PathBuf};

use content_transfer::ManagerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtmConfig {
    /// Print percentage lines while transfers run.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,

    /// Settings handed to the transfer manager.
    #[serde(default)]
    pub manager: ManagerConfig,
}

fn default_show_progress() -> bool {
    true
}

impl Default for CtmConfig {
    fn default() -> Self {
        Self {
            show_progress: default_show_progress(),
            manager: ManagerConfig::default(),
        }
    }
}

impl CtmConfig {
    /// Loads `path` (or the default location), writing a default file
    /// first if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: CtmConfig = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = CtmConfig::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

fn config_path() -> PathBuf {
    config_base_dir().join("content-transfer").join("ctm.toml")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(xdg);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ctm.toml");

        let config = CtmConfig::load(Some(&path)).unwrap();
        assert_eq!(config, CtmConfig::default());
        assert!(path.exists());

        let reloaded = CtmConfig::load(Some(&path)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctm.toml");
        std::fs::write(
            &path,
            "show_progress = false\n\n[manager]\ndefault_timeout_secs = 45\nupload_base_uri = \"https://files.example.com/up\"\n",
        )
        .unwrap();

        let config = CtmConfig::load(Some(&path)).unwrap();
        assert!(!config.show_progress);
        assert_eq!(config.manager.default_timeout_secs, 45);
        assert_eq!(
            config.manager.upload_base_uri.as_deref(),
            Some("https://files.example.com/up")
        );
        assert_eq!(config.manager.max_buffer_size, ManagerConfig::default().max_buffer_size);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctm.toml");
        std::fs::write(&path, "manager = 3").unwrap();
        assert!(CtmConfig::load(Some(&path)).is_err());
    }
}
