//! Harness configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`beacon.toml`)
//! - Environment variables (`BEACON_MARKER`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tenvis_beacon_core::DispatchConfig;

/// Environment variable overriding the tracking marker.
pub const MARKER_ENV: &str = "BEACON_MARKER";

/// Harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scene to run when none is given on the command line.
    #[serde(default)]
    pub scene: Option<PathBuf>,

    /// Dispatcher configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Load configuration from file or defaults, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "beacon.toml",
            "/etc/beacon/beacon.toml",
            "~/.config/beacon/beacon.toml",
        ];

        let mut config = Self::default();
        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                config = Self::from_file(expanded.as_ref())?;
                break;
            }
        }

        config.override_marker(std::env::var(MARKER_ENV).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Scene paths are relative to the config file.
        if let (Some(scene), Some(dir)) = (&config.scene, path.parent()) {
            let expanded = PathBuf::from(shellexpand::tilde(&scene.to_string_lossy()).as_ref());
            config.scene = Some(if expanded.is_relative() {
                dir.join(expanded)
            } else {
                expanded
            });
        }

        Ok(config)
    }

    /// Replace the tracking marker when an override is set.
    pub fn override_marker(&mut self, marker: Option<String>) {
        if let Some(marker) = marker.filter(|m| !m.is_empty()) {
            tracing::debug!(marker = %marker, "Tracking marker overridden");
            self.dispatch.marker = marker;
        }
    }
}
