//! Tool configuration, stored as JSON.
//!
//! Resolution order: `--config <path>`, then the `ECUMAP_CONFIG` environment
//! variable, then built-in defaults. Every field is optional in the file.

use calmap_core::catalog::{Catalog, CatalogError, CatalogPreset};
use calmap_io::{BackupScheme, ScaleBand};
use calmap_scan::ScanOptions;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "ECUMAP_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub catalog_preset: CatalogPreset,
    /// JSON catalog used instead of the preset.
    pub catalog_file: Option<PathBuf>,
    pub scale_band: ScaleBand,
    pub backup_scheme: BackupScheme,
    pub scan: ScanOptions,
    pub journal_file: Option<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            catalog_preset: CatalogPreset::M21,
            catalog_file: None,
            scale_band: ScaleBand::default(),
            backup_scheme: BackupScheme::default(),
            scan: ScanOptions::default(),
            journal_file: None,
        }
    }
}

impl ToolConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ToolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        ::log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Config from an explicit path, else `ECUMAP_CONFIG`, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let band = self.scale_band;
        if !(band.min.is_finite() && band.max.is_finite()) || band.min <= 0.0 || band.min > band.max {
            return Err(ConfigError::Invalid(format!(
                "scale_band [{}, {}] must be positive and ordered",
                band.min, band.max
            )));
        }
        if self.scan.step == 0 {
            return Err(ConfigError::Invalid("scan.step must be at least 1".into()));
        }
        Ok(())
    }

    /// The catalog this configuration selects.
    pub fn catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_file {
            Some(path) => Catalog::from_file(path),
            None => Ok(Catalog::preset(self.catalog_preset)),
        }
    }
}
