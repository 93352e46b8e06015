//! Configuration management for streamer-agu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (STREAMER_AGU_REGISTER_WIDTH, etc.)
//! 2. Project-local config file (`./streamer-agu.toml`)
//! 3. User config file (`~/.config/streamer-agu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # streamer-agu.toml
//!
//! # Control register width in bits (1..=64)
//! register_width = 32
//!
//! # Loop iterations vs. declared elements: "allow", "warn" or "reject"
//! coverage = "warn"
//!
//! # Case table used by `streamer-agu run` without an argument
//! cases_path = "cases/reshuffle.toml"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::streamer::{CoveragePolicy, DEFAULT_REGISTER_WIDTH};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Default case table location.
pub const DEFAULT_CASES_PATH: &str = "cases/reshuffle.toml";

/// streamer-agu configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Control register width in bits.
    pub register_width: Option<u32>,

    /// Policy for loop nests that do not cover the declared elements.
    pub coverage: Option<CoveragePolicy>,

    /// Case table for the suite runner.
    pub cases_path: Option<String>,

    /// Consecutive stalled cycles tolerated by the driver.
    /// Unlimited when unset.
    pub max_stall_cycles: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `streamer-agu.toml`
    /// 3. User config `~/.config/streamer-agu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Register width, clamped to 1..=64, default 32.
    pub fn register_width(&self) -> u32 {
        self.register_width
            .unwrap_or(DEFAULT_REGISTER_WIDTH)
            .clamp(1, 64)
    }

    /// Coverage policy, default `warn`.
    pub fn coverage(&self) -> CoveragePolicy {
        self.coverage.unwrap_or_default()
    }

    pub fn cases_path(&self) -> PathBuf {
        PathBuf::from(
            self.cases_path
                .clone()
                .unwrap_or_else(|| DEFAULT_CASES_PATH.to_string()),
        )
    }

    pub fn max_stall_cycles(&self) -> Option<u64> {
        self.max_stall_cycles
    }

    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("streamer-agu.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.register_width.is_some() {
            self.register_width = other.register_width;
        }
        if other.coverage.is_some() {
            self.coverage = other.coverage;
        }
        if other.cases_path.is_some() {
            self.cases_path = other.cases_path;
        }
        if other.max_stall_cycles.is_some() {
            self.max_stall_cycles = other.max_stall_cycles;
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup. Unparseable values are
    /// reported and skipped.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("STREAMER_AGU_REGISTER_WIDTH") {
            match value.trim().parse::<u32>() {
                Ok(width) => {
                    log::info!("Using STREAMER_AGU_REGISTER_WIDTH from environment: {}", width);
                    self.register_width = Some(width);
                }
                Err(e) => log::warn!("Ignoring STREAMER_AGU_REGISTER_WIDTH={}: {}", value, e),
            }
        }
        if let Some(value) = lookup("STREAMER_AGU_COVERAGE") {
            match value.trim().parse::<CoveragePolicy>() {
                Ok(policy) => {
                    log::info!("Using STREAMER_AGU_COVERAGE from environment: {}", policy);
                    self.coverage = Some(policy);
                }
                Err(e) => log::warn!("Ignoring STREAMER_AGU_COVERAGE: {}", e),
            }
        }
        if let Some(path) = lookup("STREAMER_AGU_CASES") {
            log::info!("Using STREAMER_AGU_CASES from environment: {}", path);
            self.cases_path = Some(path);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("streamer-agu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# streamer-agu configuration
# Place this file at ~/.config/streamer-agu/config.toml or ./streamer-agu.toml

# Control register width in bits (1..=64)
register_width = 32

# What to do when the loop nest does not visit exactly nb_elements indices:
# "allow", "warn" or "reject"
coverage = "warn"

# Case table used by `streamer-agu run` when no path is given
cases_path = "cases/reshuffle.toml"

# Fail a run after this many consecutive stalled cycles (unlimited if unset)
# max_stall_cycles = 1000
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.register_width(), 32);
        assert_eq!(config.coverage(), CoveragePolicy::Warn);
        assert_eq!(config.cases_path(), PathBuf::from("cases/reshuffle.toml"));
        assert_eq!(config.max_stall_cycles(), None);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            register_width: Some(16),
            coverage: None,
            cases_path: Some("base.toml".to_string()),
            max_stall_cycles: None,
        };

        let overlay = Config {
            register_width: None,
            coverage: Some(CoveragePolicy::Reject),
            cases_path: Some("overlay.toml".to_string()),
            max_stall_cycles: None,
        };

        base.merge(overlay);

        // register_width unchanged (overlay was None)
        assert_eq!(base.register_width, Some(16));
        assert_eq!(base.coverage, Some(CoveragePolicy::Reject));
        assert_eq!(base.cases_path, Some("overlay.toml".to_string()));
        assert_eq!(base.max_stall_cycles, None);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STREAMER_AGU_REGISTER_WIDTH", "8"),
            ("STREAMER_AGU_COVERAGE", "Allow"),
        ]
        .into_iter()
        .collect();

        let mut config = Config {
            register_width: Some(16),
            cases_path: Some("kept.toml".to_string()),
            ..Config::default()
        };
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.register_width(), 8);
        assert_eq!(config.coverage(), CoveragePolicy::Allow);
        assert_eq!(config.cases_path(), PathBuf::from("kept.toml"));
    }

    #[test]
    fn test_bad_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "STREAMER_AGU_REGISTER_WIDTH" => Some("wide".to_string()),
            "STREAMER_AGU_COVERAGE" => Some("sometimes".to_string()),
            _ => None,
        });
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_width_clamped() {
        let config = Config {
            register_width: Some(128),
            ..Config::default()
        };
        assert_eq!(config.register_width(), 64);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.coverage(), CoveragePolicy::Warn);
        assert_eq!(config.register_width, Some(32));
    }
}
