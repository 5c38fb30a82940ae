//! `MapTool`: the application facade the CLI drives.
//!
//! Holds the catalog and configuration, resolves names to descriptors, and
//! funnels every mutation through one path: plan against the current bytes,
//! then (unless dry-run) back up, write, persist and journal. Writes to the
//! same image are serialized with a per-path lock; reads take no lock.

use crate::config::{ConfigError, ToolConfig};
use crate::data::export::{self, ImportError};
use crate::log::edit_journal::EditJournal;
use calmap_core::catalog::{Catalog, CatalogError};
use calmap_core::descriptor::{ConfigParameter, Table, TableDescriptor};
use calmap_diff::{DeltaTable, DiffError};
use calmap_io::{editor, reader, EditError, EditOutcome, ImageStore, Patch, ReadError, ScaleBand};
use calmap_scan::{ScanCandidate, ScanOptions};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),
    #[error("No table matches '{0}'")]
    NoMatch(String),
    #[error("Unknown preset: {0} (available: fuel-enrich, revlimit)")]
    UnknownPreset(String),
}

// ─── Edits ──────────────────────────────────────────────────────────────────

/// One requested mutation of an image.
#[derive(Debug, Clone)]
pub enum Edit {
    Cell {
        table: TableDescriptor,
        row: usize,
        col: usize,
        value: f64,
    },
    Table {
        table: TableDescriptor,
        values: Vec<Vec<f64>>,
    },
    Scale {
        table: TableDescriptor,
        multiplier: f64,
    },
    Param {
        param: ConfigParameter,
        value: f64,
    },
    Restore {
        backup: PathBuf,
    },
}

impl Edit {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Cell { .. } => "Write Cell",
            Self::Table { .. } => "Write Table",
            Self::Scale { .. } => "Scale Table",
            Self::Param { .. } => "Write Parameter",
            Self::Restore { .. } => "Restore Backup",
        }
    }

    /// Compute the patches this edit would write, validating everything.
    pub fn plan(&self, image: &[u8], band: ScaleBand) -> Result<Vec<Patch>, EditError> {
        match self {
            Self::Cell {
                table,
                row,
                col,
                value,
            } => editor::plan_write_cell(image, table, *row, *col, *value),
            Self::Table { table, values } => editor::plan_write_table(image, table, values),
            Self::Scale { table, multiplier } => {
                editor::plan_scale_table(image, table, *multiplier, band)
            }
            Self::Param { param, value } => editor::plan_write_config_param(image, param, *value),
            Self::Restore { backup } => editor::plan_restore(image, std::fs::read(backup)?),
        }
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell {
                table,
                row,
                col,
                value,
            } => write!(f, "{} [{},{}] = {:.2} {}", table.name, row, col, value, table.unit),
            Self::Table { table, .. } => write!(f, "{} ({} cells)", table.name, table.cell_count()),
            Self::Scale { table, multiplier } => write!(f, "{} x{}", table.name, multiplier),
            Self::Param { param, value } => write!(f, "{} = {} {}", param.name, value, param.unit),
            Self::Restore { backup } => write!(f, "from {}", backup.display()),
        }
    }
}

/// Canned modifications.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Preset {
    /// +5% across the main fuel map.
    FuelEnrich,
    /// Set the rev limiter to the given RPM.
    RevLimit(f64),
}

pub const FUEL_ENRICH_MULTIPLIER: f64 = 1.05;
const FUEL_MAP: &str = "Main Fuel Map";
const REV_LIMITER: &str = "Rev Limiter";

impl Preset {
    pub fn parse(name: &str, rpm: Option<f64>) -> Result<Self, AppError> {
        match (name.to_lowercase().as_str(), rpm) {
            ("fuel-enrich", _) => Ok(Self::FuelEnrich),
            ("revlimit", Some(rpm)) => Ok(Self::RevLimit(rpm)),
            ("revlimit", None) => Err(AppError::UnknownPreset("revlimit needs an RPM value".into())),
            _ => Err(AppError::UnknownPreset(name.to_string())),
        }
    }
}

/// Outcome of an edit: what was planned, and what was written if applied.
#[derive(Debug, Clone)]
pub struct EditReport {
    pub edit: Edit,
    pub patches: Vec<Patch>,
    pub outcome: Option<EditOutcome>,
}

// ─── Facade ─────────────────────────────────────────────────────────────────

pub struct MapTool {
    catalog: Catalog,
    config: ToolConfig,
    journal: Mutex<EditJournal>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl MapTool {
    pub fn new(config: ToolConfig) -> Result<Self, AppError> {
        config.validate()?;
        let catalog = config.catalog()?;
        Ok(Self::with_catalog(catalog, config))
    }

    pub fn with_catalog(catalog: Catalog, config: ToolConfig) -> Self {
        ::log::debug!(
            "Catalog: {} tables, {} parameters",
            catalog.tables().len(),
            catalog.params().len()
        );
        Self {
            catalog,
            config,
            journal: Mutex::new(EditJournal::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn journal(&self) -> EditJournal {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ── Lookup ──

    pub fn list_tables(&self) -> &[TableDescriptor] {
        self.catalog.tables()
    }

    pub fn find_table(&self, name: &str) -> Result<&TableDescriptor, AppError> {
        self.catalog
            .table(name)
            .ok_or_else(|| AppError::UnknownTable(name.to_string()))
    }

    pub fn find_param(&self, name: &str) -> Result<&ConfigParameter, AppError> {
        self.catalog
            .param(name)
            .ok_or_else(|| AppError::UnknownParam(name.to_string()))
    }

    /// Tables matching `filter`; an empty selection is an error.
    pub fn select(&self, filter: &str) -> Result<Vec<&TableDescriptor>, AppError> {
        let selected = self.catalog.select(filter);
        if selected.is_empty() {
            return Err(AppError::NoMatch(filter.to_string()));
        }
        Ok(selected)
    }

    // ── Reads ──

    pub fn read_table(&self, path: &Path, descriptor: &TableDescriptor) -> Result<Table, AppError> {
        Ok(reader::read_table_file(path, descriptor)?)
    }

    /// Every table matching `filter`, each with its own result.
    pub fn read_tables(
        &self,
        path: &Path,
        filter: &str,
    ) -> Result<Vec<(&TableDescriptor, Result<Table, ReadError>)>, AppError> {
        let image = std::fs::read(path)?;
        let selected = self.select(filter)?;
        Ok(selected
            .into_iter()
            .map(|d| (d, reader::read_table(&image, d)))
            .collect())
    }

    pub fn read_config_param(&self, path: &Path, param: &ConfigParameter) -> Result<f64, AppError> {
        let image = std::fs::read(path)?;
        Ok(reader::read_scalar(&image, param)?)
    }

    pub fn scan(&self, path: &Path, options: &ScanOptions) -> Result<Vec<ScanCandidate>, AppError> {
        let image = std::fs::read(path)?;
        ::log::info!("Scanning {} ({} bytes, 0x{:X})", path.display(), image.len(), image.len());
        Ok(calmap_scan::scan(&image, options))
    }

    pub fn diff_tables(
        &self,
        path_a: &Path,
        path_b: &Path,
        descriptor: &TableDescriptor,
    ) -> Result<DeltaTable, AppError> {
        let a = std::fs::read(path_a)?;
        let b = std::fs::read(path_b)?;
        Ok(calmap_diff::diff_images(&a, &b, descriptor)?)
    }

    pub fn compare(
        &self,
        path_a: &Path,
        path_b: &Path,
        filter: &str,
    ) -> Result<Vec<(&TableDescriptor, Result<DeltaTable, DiffError>)>, AppError> {
        self.select(filter)?;
        let a = std::fs::read(path_a)?;
        let b = std::fs::read(path_b)?;
        Ok(calmap_diff::diff_catalog(&a, &b, &self.catalog, filter))
    }

    pub fn list_backups(&self, path: &Path) -> Result<Vec<PathBuf>, AppError> {
        Ok(calmap_io::list_backups(path)?)
    }

    // ── Writes ──

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key).or_default().clone()
    }

    /// Plan `edit` against the image at `path`; apply it unless `dry_run`.
    pub fn edit(&self, path: &Path, edit: Edit, dry_run: bool) -> Result<EditReport, AppError> {
        if dry_run {
            let image = std::fs::read(path)?;
            let patches = edit.plan(&image, self.config.scale_band)?;
            ::log::info!("[dry-run] {} {}: {} patch(es)", edit.operation(), edit, patches.len());
            return Ok(EditReport {
                edit,
                patches,
                outcome: None,
            });
        }
        let (patches, outcome) = self.commit(path, &edit)?;
        Ok(EditReport {
            edit,
            patches,
            outcome: Some(outcome),
        })
    }

    fn commit(&self, path: &Path, edit: &Edit) -> Result<(Vec<Patch>, EditOutcome), AppError> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut store = ImageStore::open_with_scheme(path, self.config.backup_scheme)?;
        let patches = edit.plan(store.bytes(), self.config.scale_band)?;
        let outcome = editor::apply_patches(&mut store, &patches)?;

        let mut journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
        let entry = journal
            .record(edit.operation(), &edit.to_string(), path, &outcome.backup)
            .clone();
        if let Some(journal_file) = &self.config.journal_file {
            if let Err(e) = journal.append_entry(&entry, journal_file) {
                ::log::warn!("Could not append to journal {}: {}", journal_file.display(), e);
            }
        }
        Ok((patches, outcome))
    }

    pub fn write_cell(
        &self,
        path: &Path,
        descriptor: &TableDescriptor,
        row: usize,
        col: usize,
        value: f64,
        dry_run: bool,
    ) -> Result<EditReport, AppError> {
        let edit = Edit::Cell {
            table: descriptor.clone(),
            row,
            col,
            value,
        };
        self.edit(path, edit, dry_run)
    }

    pub fn write_table(
        &self,
        path: &Path,
        descriptor: &TableDescriptor,
        values: Vec<Vec<f64>>,
        dry_run: bool,
    ) -> Result<EditReport, AppError> {
        let edit = Edit::Table {
            table: descriptor.clone(),
            values,
        };
        self.edit(path, edit, dry_run)
    }

    pub fn scale_table(
        &self,
        path: &Path,
        descriptor: &TableDescriptor,
        multiplier: f64,
        dry_run: bool,
    ) -> Result<EditReport, AppError> {
        let edit = Edit::Scale {
            table: descriptor.clone(),
            multiplier,
        };
        self.edit(path, edit, dry_run)
    }

    pub fn write_config_param(
        &self,
        path: &Path,
        param: &ConfigParameter,
        value: f64,
        dry_run: bool,
    ) -> Result<EditReport, AppError> {
        let edit = Edit::Param {
            param: param.clone(),
            value,
        };
        self.edit(path, edit, dry_run)
    }

    /// Put a backup's content back; the current content is backed up first.
    pub fn restore_backup(&self, path: &Path, backup: &Path, dry_run: bool) -> Result<EditReport, AppError> {
        let edit = Edit::Restore {
            backup: backup.to_path_buf(),
        };
        self.edit(path, edit, dry_run)
    }

    pub fn apply_preset(&self, path: &Path, preset: Preset, dry_run: bool) -> Result<EditReport, AppError> {
        let edit = self.preset_edit(preset)?;
        self.edit(path, edit, dry_run)
    }

    /// The edit a preset stands for, resolved against the catalog.
    pub fn preset_edit(&self, preset: Preset) -> Result<Edit, AppError> {
        match preset {
            Preset::FuelEnrich => Ok(Edit::Scale {
                table: self.find_table(FUEL_MAP)?.clone(),
                multiplier: FUEL_ENRICH_MULTIPLIER,
            }),
            Preset::RevLimit(rpm) => Ok(Edit::Param {
                param: self.find_param(REV_LIMITER)?.clone(),
                value: rpm,
            }),
        }
    }

    /// Write this session's journal: JSON for a `.json` path, text otherwise.
    pub fn save_journal(&self, path: &Path) -> Result<(), AppError> {
        let journal = self.journal();
        let is_json = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("json"));
        if is_json {
            journal.save_json(path)?;
        } else {
            std::fs::write(path, journal.to_text())?;
        }
        ::log::info!("Saved journal ({} edit(s)) to {}", journal.len(), path.display());
        Ok(())
    }

    // ── Export / import ──

    /// Export every table matching `filter` into `out_dir`, one file per table.
    pub fn export(
        &self,
        path: &Path,
        filter: &str,
        out_dir: &Path,
    ) -> Result<Vec<(String, Result<PathBuf, AppError>)>, AppError> {
        std::fs::create_dir_all(out_dir)?;
        let tables = self.read_tables(path, filter)?;
        Ok(tables
            .into_iter()
            .map(|(d, result)| {
                let written = result.map_err(AppError::from).and_then(|table| {
                    let target = out_dir.join(export::export_file_name(&d.name));
                    export::write_table_file(&table, &target)?;
                    Ok(target)
                });
                if let Err(e) = &written {
                    ::log::warn!("Failed to export {}: {}", d.name, e);
                }
                (d.name.clone(), written)
            })
            .collect())
    }

    /// Write an exported file back into the image. The target table is
    /// `table` if given, else the name recorded in the file.
    pub fn import_table(
        &self,
        path: &Path,
        csv: &Path,
        table: Option<&str>,
        dry_run: bool,
    ) -> Result<EditReport, AppError> {
        let grid = export::read_grid_file(csv)?;
        let name = table
            .map(str::to_string)
            .or(grid.name)
            .ok_or_else(|| AppError::UnknownTable("(no table name in file)".into()))?;
        let descriptor = self.find_table(&name)?;
        self.write_table(path, descriptor, grid.rows, dry_run)
    }
}
