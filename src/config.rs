//! Engine configuration (`config.toml`)

use crate::device::sim::SimulatorConfig;
use crate::score::PlaceholderScores;
use crate::validation::{self, ValidationError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable pointing at an alternate config file
pub const CONFIG_ENV: &str = "FPCORE_CONFIG";

/// Enrollment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    /// Scans aggregated into one template
    pub samples: u32,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self { samples: 5 }
    }
}

/// Matching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum 0..=100 score accepted as a match
    pub threshold: u32,
    /// Score reported for a boolean match when raw scores are unavailable
    pub placeholder_matched: u8,
    /// Score reported for a boolean non-match when raw scores are unavailable
    pub placeholder_unmatched: u8,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let placeholders = PlaceholderScores::default();
        Self {
            threshold: 60,
            placeholder_matched: placeholders.matched,
            placeholder_unmatched: placeholders.unmatched,
        }
    }
}

impl MatchingConfig {
    pub fn placeholders(&self) -> PlaceholderScores {
        PlaceholderScores {
            matched: self.placeholder_matched,
            unmatched: self.placeholder_unmatched,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_threshold(self.threshold)?;
        validation::validate_score(self.placeholder_matched)?;
        validation::validate_score(self.placeholder_unmatched)?;
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub enrollment: EnrollmentConfig,
    pub matching: MatchingConfig,
    pub simulator: SimulatorConfig,
}

impl EngineConfig {
    /// Load configuration from file, writing defaults if it does not exist
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: EngineConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            log::info!("Config loaded from: {}", path.display());
            config
        } else {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let toml_str = toml::to_string_pretty(&config)?;
            fs::write(path, toml_str).context("Failed to write default config")?;
            log::info!("Default config created at: {}", path.display());
            config
        };

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_enroll_samples(self.enrollment.samples)?;
        self.matching.validate()?;
        if self.simulator.width == 0 || self.simulator.height == 0 {
            return Err(ValidationError::InvalidRange(
                "Simulator width and height must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("fpcore-config-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir.join("config.toml")
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.enrollment.samples, 5);
        assert_eq!(config.matching.threshold, 60);
        assert_eq!(
            config.matching.placeholders(),
            PlaceholderScores {
                matched: 95,
                unmatched: 30
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_create_writes_then_reads_back() {
        let path = temp_path("roundtrip");

        let created = EngineConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, EngineConfig::default());

        let mut edited = created.clone();
        edited.matching.threshold = 75;
        fs::write(&path, toml::to_string_pretty(&edited).unwrap()).unwrap();
        assert_eq!(EngineConfig::load_or_create(&path).unwrap(), edited);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EngineConfig = toml::from_str("[matching]\nthreshold = 40\n").unwrap();
        assert_eq!(config.matching.threshold, 40);
        assert_eq!(config.matching.placeholder_matched, 95);
        assert_eq!(config.enrollment.samples, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let path = temp_path("invalid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[enrollment]\nsamples = 0\n").unwrap();
        assert!(EngineConfig::load_or_create(&path).is_err());

        let mut config = EngineConfig::default();
        config.matching.threshold = 101;
        assert!(config.validate().is_err());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
