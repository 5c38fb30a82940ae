//! The descriptor catalog: known tables and configuration parameters.
//!
//! A catalog is built once (from a preset or a JSON file) and handed to the
//! components that need it. Presets capture the Motronic M2.1 layouts that
//! have been identified so far; they disagree on some offsets, which is why
//! they are selectable rather than merged.

use crate::descriptor::{ConfigParameter, TableDescriptor};
use crate::enums::StorageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid catalog file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown catalog preset: {0}")]
    UnknownPreset(String),
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

// ─── Presets ────────────────────────────────────────────────────────────────

/// Built-in catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogPreset {
    /// Motronic M2.1 layout verified against 964 binaries: three confirmed maps,
    /// seven scan-derived candidates, four scalar parameters.
    #[serde(rename = "m21")]
    M21,
    /// Earlier M2.1 layout with boost and cold-start maps.
    #[serde(rename = "m21-legacy")]
    M21Legacy,
}

impl CatalogPreset {
    pub const ALL: [CatalogPreset; 2] = [Self::M21, Self::M21Legacy];

    pub fn name(self) -> &'static str {
        match self {
            Self::M21 => "m21",
            Self::M21Legacy => "m21-legacy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CatalogPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─── Catalog ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
    #[serde(default)]
    pub params: Vec<ConfigParameter>,
}

impl Catalog {
    pub fn new(tables: Vec<TableDescriptor>, params: Vec<ConfigParameter>) -> Result<Self, CatalogError> {
        let catalog = Self { tables, params };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn preset(preset: CatalogPreset) -> Self {
        match preset {
            CatalogPreset::M21 => Self {
                tables: m21_tables(),
                params: m21_params(),
            },
            CatalogPreset::M21Legacy => Self {
                tables: m21_legacy_tables(),
                params: m21_legacy_params(),
            },
        }
    }

    pub fn from_preset_name(name: &str) -> Result<Self, CatalogError> {
        CatalogPreset::from_name(name)
            .map(Self::preset)
            .ok_or_else(|| CatalogError::UnknownPreset(name.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        for t in &self.tables {
            t.check().map_err(CatalogError::InvalidDescriptor)?;
        }
        for p in &self.params {
            p.check().map_err(CatalogError::InvalidDescriptor)?;
        }
        Ok(())
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn params(&self) -> &[ConfigParameter] {
        &self.params
    }

    /// Exact (case-insensitive) table lookup.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Exact (case-insensitive) parameter lookup.
    pub fn param(&self, name: &str) -> Option<&ConfigParameter> {
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Tables whose name contains `filter` (case-insensitive); `"all"` selects
    /// every table.
    pub fn select(&self, filter: &str) -> Vec<&TableDescriptor> {
        if filter.eq_ignore_ascii_case("all") {
            return self.tables.iter().collect();
        }
        let needle = filter.to_lowercase();
        self.tables
            .iter()
            .filter(|t| t.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// The known table that shares bytes with `[start, start + len)`, if any.
    pub fn overlapping(&self, start: u64, len: usize) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.overlaps(start, len))
    }
}

// ─── Preset contents ────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn u8_map(name: &str, offset: u64, rows: usize, cols: usize, scale: f64, bias: f64, unit: &str, description: &str) -> TableDescriptor {
    TableDescriptor {
        name: name.to_string(),
        offset,
        rows,
        cols,
        format: StorageFormat::U8,
        scale,
        bias,
        unit: unit.to_string(),
        description: description.to_string(),
    }
}

fn u8_param(name: &str, offset: u64, scale: f64, unit: &str, description: &str, min: f64, max: f64) -> ConfigParameter {
    ConfigParameter {
        name: name.to_string(),
        offset,
        format: StorageFormat::U8,
        scale,
        bias: 0.0,
        unit: unit.to_string(),
        description: description.to_string(),
        min,
        max,
    }
}

fn m21_tables() -> Vec<TableDescriptor> {
    vec![
        u8_map("Main Fuel Map", 0x6700, 8, 16, 0.04, 0.0, "ms", "Primary fuel injection duration map (confirmed)"),
        u8_map("Ignition Timing Map", 0x6780, 8, 16, 0.75, -24.0, "deg", "Spark advance timing map (confirmed)"),
        u8_map("Lambda Target Map", 0x6800, 8, 16, 0.01, 0.5, "λ", "Target air-fuel ratio map (confirmed)"),
        u8_map("Correction Table 1", 0x60C0, 8, 8, 0.01, 0.0, "%", "Limits/correction table (variance: 100.3)"),
        u8_map("Fuel/Timing Trim 1", 0x6CC0, 8, 16, 0.01, 0.0, "%", "Fuel or timing trim table (variance: 260.9)"),
        u8_map("Correction Table 2", 0x6D00, 8, 8, 0.01, 0.0, "%", "Correction table (variance: 125.1)"),
        u8_map("Fuel/Timing Trim 2", 0x6EC0, 8, 16, 0.01, 0.0, "%", "Fuel or timing trim table (variance: 385.8)"),
        u8_map("Correction Table 3", 0x6F80, 8, 8, 0.01, 0.0, "%", "Correction table (variance: 136.3)"),
        u8_map("Trim Table 1", 0x7140, 8, 16, 0.01, 0.0, "%", "Trim table (variance: 196.6)"),
        u8_map("Trim Table 2", 0x7200, 8, 16, 0.01, 0.0, "%", "Trim table (variance: 237.1)"),
    ]
}

fn m21_params() -> Vec<ConfigParameter> {
    vec![
        u8_param("Rev Limiter", 0x7000, 85.37, "RPM", "Maximum engine RPM limit (stock 964: ~7000 RPM)", 6000.0, 7500.0),
        u8_param("Idle Speed Target", 0x7001, 10.0, "RPM", "Target idle speed (stock 964: ~820 RPM)", 650.0, 1100.0),
        u8_param("Unknown Param 1", 0x7002, 1.0, "raw", "Unknown parameter at 0x7002 (stock 964: 75)", 0.0, 255.0),
        u8_param("Unknown Param 2", 0x7003, 1.0, "raw", "Unknown parameter at 0x7003 (stock 964: 70)", 0.0, 255.0),
    ]
}

fn m21_legacy_tables() -> Vec<TableDescriptor> {
    vec![
        u8_map("Main Fuel Map", 0x6700, 8, 16, 0.04, 0.0, "ms", "Primary fuel injection duration map"),
        u8_map("Ignition Timing Map", 0x6780, 8, 16, 0.75, -24.0, "deg", "Spark advance timing map"),
        u8_map("Lambda Target Map", 0x6800, 8, 16, 0.01, 0.5, "λ", "Target air-fuel ratio map"),
        u8_map("Boost Control Map", 0x7900, 8, 8, 0.1, 0.0, "bar", "Wastegate duty cycle / boost target"),
        u8_map("Cold Start Enrichment", 0x7A00, 8, 8, 0.02, 0.0, "%", "Cold start fuel enrichment multiplier"),
    ]
}

fn m21_legacy_params() -> Vec<ConfigParameter> {
    vec![u8_param("Rev Limiter", 0x7000, 50.0, "RPM", "Maximum engine RPM limit", 3000.0, 7500.0)]
}
