//! Configuration management for dsp48-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`DSP48_MULTIPLIER_LATENCY`, etc.)
//! 2. Project-local config file (`./dsp48-emu.toml`)
//! 3. User config file (`~/.config/dsp48-emu/config.toml`)
//! 4. Built-in defaults ([`PipelineConfig::default`])
//!
//! # Config File Format
//!
//! ```toml
//! # dsp48-emu.toml
//!
//! # Stage latencies in cycles
//! multiplier_latency = 2
//! adder_latency = 1
//!
//! # Round accumulated values half to even
//! enable_rounding = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::tensor::PipelineConfig;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

const LOCAL_FILE: &str = "dsp48-emu.toml";
const APP_DIR: &str = "dsp48-emu";

/// Errors loading an explicitly named config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// dsp48-emu configuration. Unset fields fall back to the pipeline defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub multiplier_latency: Option<u32>,
    pub adder_latency: Option<u32>,
    pub accumulator_latency: Option<u32>,
    pub rounding_latency: Option<u32>,
    pub saturation_latency: Option<u32>,
    pub enable_rounding: Option<bool>,
    pub enable_saturation: Option<bool>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `dsp48-emu.toml`
    /// 3. User config `~/.config/dsp48-emu/config.toml`
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

    /// Load an explicit config file, with environment overrides on top.
    ///
    /// Unlike the search in [`Config::load`], a missing or malformed file is
    /// an error here.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay the configured values onto [`PipelineConfig::default`].
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = PipelineConfig::default();
        if let Some(v) = self.multiplier_latency {
            pipeline.multiplier_latency = v;
        }
        if let Some(v) = self.adder_latency {
            pipeline.adder_latency = v;
        }
        if let Some(v) = self.accumulator_latency {
            pipeline.accumulator_latency = v;
        }
        if let Some(v) = self.rounding_latency {
            pipeline.rounding_latency = v;
        }
        if let Some(v) = self.saturation_latency {
            pipeline.saturation_latency = v;
        }
        if let Some(v) = self.enable_rounding {
            pipeline.enable_rounding = v;
        }
        if let Some(v) = self.enable_saturation {
            pipeline.enable_saturation = v;
        }
        pipeline
    }

    /// Load user configuration from ~/.config/dsp48-emu/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./dsp48-emu.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new(LOCAL_FILE);
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join(LOCAL_FILE);
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a file found by search; problems are logged.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match Self::load_file_strict(path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }

    fn load_file_strict(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        self.multiplier_latency = other.multiplier_latency.or(self.multiplier_latency);
        self.adder_latency = other.adder_latency.or(self.adder_latency);
        self.accumulator_latency = other.accumulator_latency.or(self.accumulator_latency);
        self.rounding_latency = other.rounding_latency.or(self.rounding_latency);
        self.saturation_latency = other.saturation_latency.or(self.saturation_latency);
        self.enable_rounding = other.enable_rounding.or(self.enable_rounding);
        self.enable_saturation = other.enable_saturation.or(self.enable_saturation);
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let latencies = [
            ("DSP48_MULTIPLIER_LATENCY", &mut self.multiplier_latency),
            ("DSP48_ADDER_LATENCY", &mut self.adder_latency),
            ("DSP48_ACCUMULATOR_LATENCY", &mut self.accumulator_latency),
            ("DSP48_ROUNDING_LATENCY", &mut self.rounding_latency),
            ("DSP48_SATURATION_LATENCY", &mut self.saturation_latency),
        ];
        for (name, field) in latencies {
            if let Some(raw) = lookup(name) {
                match raw.trim().parse::<u32>() {
                    Ok(value) => {
                        log::info!("Using {} from environment: {}", name, value);
                        *field = Some(value);
                    }
                    Err(e) => log::warn!("Ignoring {}={:?}: {}", name, raw, e),
                }
            }
        }

        let flags = [
            ("DSP48_ENABLE_ROUNDING", &mut self.enable_rounding),
            ("DSP48_ENABLE_SATURATION", &mut self.enable_saturation),
        ];
        for (name, field) in flags {
            if let Some(raw) = lookup(name) {
                match parse_flag(&raw) {
                    Some(value) => {
                        log::info!("Using {} from environment: {}", name, value);
                        *field = Some(value);
                    }
                    None => log::warn!("Ignoring {}={:?}: expected a boolean", name, raw),
                }
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# dsp48-emu configuration
# Place this file at ~/.config/dsp48-emu/config.toml or ./dsp48-emu.toml

# Stage latencies in cycles (0 makes a stage combinational)
multiplier_latency = 2
adder_latency = 1
accumulator_latency = 1
rounding_latency = 1
saturation_latency = 0

# Round accumulated values half to even before output
enable_rounding = true

# Clamp non-finite results to +/- f32::MAX
enable_saturation = false
"#
        .to_string()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
