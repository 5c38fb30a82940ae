//! Validated edits.
//!
//! Every operation comes in two halves: `plan_*` computes and validates the
//! byte patches against the current image without touching it, and the
//! matching apply function hands those patches to [`ImageStore::apply`],
//! which backs the image up before the first byte changes. A call either
//! writes every patch or none.

use crate::backup::Backup;
use crate::image::{ImageStore, Patch, StoreError};
use crate::reader::{self, ReadError};
use calmap_core::codec::{self, CodecError};
use calmap_core::descriptor::{ConfigParameter, TableDescriptor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{name}: {value} is outside the allowed range [{min}, {max}]")]
    RangeViolation {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name}: cell ({row}, {col}) is outside the {rows}x{cols} table")]
    CellOutOfBounds {
        name: String,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Multiplier {multiplier} is outside [{min}, {max}]")]
    MultiplierOutOfRange { multiplier: f64, min: f64, max: f64 },
    #[error("{name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: CodecError,
    },
    #[error("Backup failed, nothing written: {0}")]
    Backup(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("{name}: expected {expected_rows}x{expected_cols} values, got {rows}x{cols}")]
    ShapeMismatch {
        name: String,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Backup is {got} bytes but the image is {expected} bytes")]
    BackupLengthMismatch { expected: usize, got: usize },
    #[error("Image is not file-backed")]
    NotFileBacked,
}

impl From<StoreError> for EditError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Backup(io) => EditError::Backup(io),
            StoreError::Io(io) => EditError::Io(io),
            StoreError::PatchOutOfBounds {
                offset,
                len,
                image_len,
            } => EditError::Read(ReadError::Truncated {
                name: "patch".into(),
                offset,
                expected: len,
                got: image_len.saturating_sub(offset as usize),
            }),
        }
    }
}

// ─── Scale band ─────────────────────────────────────────────────────────────

/// Inclusive bounds on table multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleBand {
    pub min: f64,
    pub max: f64,
}

impl Default for ScaleBand {
    fn default() -> Self {
        Self { min: 0.5, max: 2.0 }
    }
}

impl ScaleBand {
    pub fn contains(&self, multiplier: f64) -> bool {
        multiplier >= self.min && multiplier <= self.max
    }
}

/// What an applied edit did.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub backup: Backup,
    pub bytes_written: usize,
}

fn encode_error(name: &str) -> impl FnOnce(CodecError) -> EditError + '_ {
    move |source| EditError::Encode {
        name: name.to_string(),
        source,
    }
}

// ─── Planning ───────────────────────────────────────────────────────────────

pub fn plan_write_cell(
    image: &[u8],
    descriptor: &TableDescriptor,
    row: usize,
    col: usize,
    value: f64,
) -> Result<Vec<Patch>, EditError> {
    if !descriptor.contains_cell(row, col) {
        return Err(EditError::CellOutOfBounds {
            name: descriptor.name.clone(),
            row,
            col,
            rows: descriptor.rows,
            cols: descriptor.cols,
        });
    }
    let offset = descriptor
        .cell_offset(row, col)
        .ok_or_else(|| ReadError::OffsetOutOfBounds {
            name: descriptor.name.clone(),
            offset: descriptor.offset,
            image_len: image.len(),
        })?;
    reader::region(image, &descriptor.name, offset, descriptor.format.width())?;
    let bytes = descriptor
        .encode_cell(value)
        .map_err(encode_error(&descriptor.name))?;
    Ok(vec![Patch::new(offset, bytes)])
}

/// Whole-table write from a row-major grid of physical values.
pub fn plan_write_table(
    image: &[u8],
    descriptor: &TableDescriptor,
    values: &[Vec<f64>],
) -> Result<Vec<Patch>, EditError> {
    let cols = values.first().map_or(0, |r| r.len());
    if values.len() != descriptor.rows || values.iter().any(|r| r.len() != descriptor.cols) {
        return Err(EditError::ShapeMismatch {
            name: descriptor.name.clone(),
            expected_rows: descriptor.rows,
            expected_cols: descriptor.cols,
            rows: values.len(),
            cols,
        });
    }
    reader::region(image, &descriptor.name, descriptor.offset, descriptor.byte_len())?;

    let mut bytes = Vec::with_capacity(descriptor.byte_len());
    for &v in values.iter().flatten() {
        bytes.extend(
            descriptor
                .encode_cell(v)
                .map_err(encode_error(&descriptor.name))?,
        );
    }
    Ok(vec![Patch::new(descriptor.offset, bytes)])
}

/// Multiply every raw cell, truncating toward zero.
pub fn plan_scale_table(
    image: &[u8],
    descriptor: &TableDescriptor,
    multiplier: f64,
    band: ScaleBand,
) -> Result<Vec<Patch>, EditError> {
    if !band.contains(multiplier) {
        return Err(EditError::MultiplierOutOfRange {
            multiplier,
            min: band.min,
            max: band.max,
        });
    }
    let table = reader::read_table(image, descriptor)?;
    let mut bytes = Vec::with_capacity(descriptor.byte_len());
    for &raw in table.raw_values() {
        let scaled = codec::quantize(raw as f64 * multiplier, descriptor.format)
            .map_err(encode_error(&descriptor.name))?;
        bytes.extend(codec::encode_raw(scaled, descriptor.format));
    }
    Ok(vec![Patch::new(descriptor.offset, bytes)])
}

pub fn plan_write_config_param(
    image: &[u8],
    param: &ConfigParameter,
    value: f64,
) -> Result<Vec<Patch>, EditError> {
    if !param.in_range(value) {
        return Err(EditError::RangeViolation {
            name: param.name.clone(),
            value,
            min: param.min,
            max: param.max,
        });
    }
    plan_write_cell(image, &param.as_table(), 0, 0, value)
}

/// Replace the whole image with `content`; lengths must agree.
pub fn plan_restore(image: &[u8], content: Vec<u8>) -> Result<Vec<Patch>, EditError> {
    if content.len() != image.len() {
        return Err(EditError::BackupLengthMismatch {
            expected: image.len(),
            got: content.len(),
        });
    }
    Ok(vec![Patch::new(0, content)])
}

// ─── Applying ───────────────────────────────────────────────────────────────

/// Back up the image, then write the planned patches.
pub fn apply_patches(store: &mut ImageStore, patches: &[Patch]) -> Result<EditOutcome, EditError> {
    let backup = store.apply(patches)?;
    let bytes_written = patches.iter().map(|p| p.bytes.len()).sum();
    Ok(EditOutcome {
        backup,
        bytes_written,
    })
}

pub fn write_cell(
    store: &mut ImageStore,
    descriptor: &TableDescriptor,
    row: usize,
    col: usize,
    value: f64,
) -> Result<EditOutcome, EditError> {
    let patches = plan_write_cell(store.bytes(), descriptor, row, col, value)?;
    apply_patches(store, &patches)
}

pub fn write_table(
    store: &mut ImageStore,
    descriptor: &TableDescriptor,
    values: &[Vec<f64>],
) -> Result<EditOutcome, EditError> {
    let patches = plan_write_table(store.bytes(), descriptor, values)?;
    apply_patches(store, &patches)
}

pub fn scale_table(
    store: &mut ImageStore,
    descriptor: &TableDescriptor,
    multiplier: f64,
    band: ScaleBand,
) -> Result<EditOutcome, EditError> {
    let patches = plan_scale_table(store.bytes(), descriptor, multiplier, band)?;
    log::debug!("{}: scaling {} cells by {}", descriptor.name, descriptor.cell_count(), multiplier);
    apply_patches(store, &patches)
}

pub fn write_config_param(
    store: &mut ImageStore,
    param: &ConfigParameter,
    value: f64,
) -> Result<EditOutcome, EditError> {
    let patches = plan_write_config_param(store.bytes(), param, value)?;
    apply_patches(store, &patches)
}

/// Put a backup file's content back into a file-backed image. The current
/// content is itself backed up first.
pub fn restore_backup(store: &mut ImageStore, backup_path: &Path) -> Result<EditOutcome, EditError> {
    if store.path().is_none() {
        return Err(EditError::NotFileBacked);
    }
    let content = fs::read(backup_path)?;
    let patches = plan_restore(store.bytes(), content)?;
    log::info!("Restoring from {}", backup_path.display());
    apply_patches(store, &patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calmap_core::enums::StorageFormat;

    fn fuel() -> TableDescriptor {
        TableDescriptor {
            name: "Main Fuel Map".into(),
            offset: 0x10,
            rows: 2,
            cols: 4,
            format: StorageFormat::U8,
            scale: 0.04,
            bias: 0.0,
            unit: "ms".into(),
            description: String::new(),
        }
    }

    fn rev_limiter() -> ConfigParameter {
        ConfigParameter {
            name: "Rev Limiter".into(),
            offset: 0x30,
            format: StorageFormat::U8,
            scale: 50.0,
            bias: 0.0,
            unit: "RPM".into(),
            description: String::new(),
            min: 3000.0,
            max: 7500.0,
        }
    }

    fn image() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x40];
        bytes[0x10..0x18].fill(100);
        bytes[0x30] = 130;
        bytes
    }

    #[test]
    fn test_write_cell_encodes_and_backs_up() {
        let mut store = ImageStore::from_bytes(image());
        let outcome = write_cell(&mut store, &fuel(), 1, 2, 4.2).unwrap();
        assert_eq!(outcome.bytes_written, 1);
        assert_eq!(store.bytes()[0x10 + 6], 105);
        assert_eq!(store.snapshot(&outcome.backup).unwrap(), image().as_slice());
    }

    #[test]
    fn test_write_cell_out_of_bounds() {
        let mut store = ImageStore::from_bytes(image());
        let err = write_cell(&mut store, &fuel(), 2, 0, 1.0).unwrap_err();
        assert!(matches!(err, EditError::CellOutOfBounds { row: 2, .. }));
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_write_cell_address_overflow() {
        let d = TableDescriptor {
            offset: u64::MAX,
            rows: 1,
            cols: 2,
            ..fuel()
        };
        let image = [7u8; 16];
        for col in 0..2 {
            let err = plan_write_cell(&image, &d, 0, col, 3.0).unwrap_err();
            assert!(matches!(
                err,
                EditError::Read(ReadError::OffsetOutOfBounds { offset: u64::MAX, image_len: 16, .. })
            ));
        }

        let mut store = ImageStore::from_bytes(image.to_vec());
        assert!(write_cell(&mut store, &d, 0, 1, 3.0).is_err());
        assert_eq!(store.bytes(), &image[..]);
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_write_cell_encode_range() {
        let mut store = ImageStore::from_bytes(image());
        // 11.0 / 0.04 = 275 does not fit a byte.
        let err = write_cell(&mut store, &fuel(), 0, 0, 11.0).unwrap_err();
        assert!(matches!(err, EditError::Encode { .. }));
        assert_eq!(store.bytes(), image().as_slice());
    }

    #[test]
    fn test_scale_table() {
        let mut store = ImageStore::from_bytes(image());
        scale_table(&mut store, &fuel(), 1.05, ScaleBand::default()).unwrap();
        assert!(store.bytes()[0x10..0x18].iter().all(|&b| b == 105));
        let t = reader::read_table(store.bytes(), &fuel()).unwrap();
        assert!((t.get(0, 0).unwrap() - 4.2).abs() < 1e-9);
    }

    #[test]
    fn test_scale_band_edges() {
        let band = ScaleBand::default();
        assert!(plan_scale_table(&image(), &fuel(), 0.5, band).is_ok());
        assert!(plan_scale_table(&image(), &fuel(), 2.0, band).is_ok());
        for m in [0.49, 2.01, f64::NAN] {
            assert!(matches!(
                plan_scale_table(&image(), &fuel(), m, band),
                Err(EditError::MultiplierOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_scale_overflow_writes_nothing() {
        let mut bytes = image();
        bytes[0x17] = 200;
        let mut store = ImageStore::from_bytes(bytes.clone());
        let err = scale_table(&mut store, &fuel(), 1.5, ScaleBand::default()).unwrap_err();
        assert!(matches!(err, EditError::Encode { .. }));
        assert_eq!(store.bytes(), bytes.as_slice());
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_config_param_range_violation() {
        let mut store = ImageStore::from_bytes(image());
        let before: u32 = store.bytes().iter().map(|&b| b as u32).sum();
        let err = write_config_param(&mut store, &rev_limiter(), 8000.0).unwrap_err();
        assert!(matches!(err, EditError::RangeViolation { .. }));
        let after: u32 = store.bytes().iter().map(|&b| b as u32).sum();
        assert_eq!(before, after);
        assert!(store.backups().is_empty());

        write_config_param(&mut store, &rev_limiter(), 7000.0).unwrap();
        assert_eq!(store.bytes()[0x30], 140);
    }

    #[test]
    fn test_write_table_shape() {
        let store = ImageStore::from_bytes(image());
        let short = vec![vec![1.0; 4]];
        assert!(matches!(
            plan_write_table(store.bytes(), &fuel(), &short),
            Err(EditError::ShapeMismatch { rows: 1, .. })
        ));
        let grid = vec![vec![0.0, 0.04, 0.08, 0.12], vec![1.0, 2.0, 3.0, 4.0]];
        let patches = plan_write_table(store.bytes(), &fuel(), &grid).unwrap();
        assert_eq!(patches[0].bytes, vec![0, 1, 2, 3, 25, 50, 75, 100]);
    }

    #[test]
    fn test_restore_backup_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu.bin");
        fs::write(&path, image()).unwrap();
        let mut store = ImageStore::open(&path).unwrap();

        let first = write_cell(&mut store, &fuel(), 0, 0, 0.0).unwrap();
        let Backup::File(first_path) = first.backup else {
            panic!("expected a file backup");
        };
        restore_backup(&mut store, &first_path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), image());
        assert_eq!(store.backups().len(), 2);
    }

    #[test]
    fn test_restore_rejects_length_mismatch() {
        assert!(matches!(
            plan_restore(&[0u8; 4], vec![0u8; 3]),
            Err(EditError::BackupLengthMismatch { expected: 4, got: 3 })
        ));
        let mut store = ImageStore::from_bytes(vec![0u8; 4]);
        assert!(matches!(
            restore_backup(&mut store, Path::new("/nonexistent")),
            Err(EditError::NotFileBacked)
        ));
    }
}
