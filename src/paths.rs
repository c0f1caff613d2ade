use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

use crate::config::CONFIG_ENV;

/// Application paths following OS conventions
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// Configuration directory (config.toml)
    pub config: PathBuf,
    /// Data directory (exported templates)
    pub data: PathBuf,
}

impl AppPaths {
    /// Resolve OS-specific paths for fprint-core
    ///
    /// # Platform Paths
    ///
    /// ## Linux
    /// - Config: `~/.config/FprintCore/`
    /// - Data: `~/.local/share/FprintCore/` → exports/
    ///
    /// ## macOS
    /// - Config: `~/Library/Preferences/com.ArkanaLabs.FprintCore/`
    /// - Data: `~/Library/Application Support/com.ArkanaLabs.FprintCore/`
    ///
    /// ## Windows
    /// - Config: `%APPDATA%\ArkanaLabs\FprintCore\config\`
    /// - Data: `%APPDATA%\ArkanaLabs\FprintCore\data\`
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "ArkanaLabs", "FprintCore")
            .context("Failed to determine project directories")?;

        Ok(Self {
            config: proj_dirs.config_dir().to_path_buf(),
            data: proj_dirs.data_dir().to_path_buf(),
        })
    }

    /// Create all necessary directories
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config).context("Failed to create config directory")?;
        fs::create_dir_all(self.exports_dir()).context("Failed to create exports directory")?;

        log::debug!("  Config: {}", self.config.display());
        log::debug!("  Data:   {}", self.data.display());
        Ok(())
    }

    /// Get path to config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Config file to load: `FPCORE_CONFIG` when set, else `config_file()`
    pub fn resolve_config_file(&self) -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.config_file(),
        }
    }

    /// Directory the demo CLI writes encoded templates to
    pub fn exports_dir(&self) -> PathBuf {
        self.data.join("exports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_creation() {
        let paths = AppPaths::new().expect("Failed to create paths");

        assert!(!paths.config.as_os_str().is_empty());
        assert!(!paths.data.as_os_str().is_empty());
        assert!(paths.config_file().ends_with("config.toml"));
        assert!(paths.exports_dir().starts_with(&paths.data));
    }
}
