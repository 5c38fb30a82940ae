//! Table differ: `B − A` per cell, plus summary statistics.

use calmap_core::catalog::Catalog;
use calmap_core::descriptor::{Table, TableDescriptor};
use calmap_io::reader::{self, ReadError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Shape mismatch: {rows_a}x{cols_a} vs {rows_b}x{cols_b}")]
    ShapeMismatch {
        rows_a: usize,
        cols_a: usize,
        rows_b: usize,
        cols_b: usize,
    },
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Per-cell differences between two tables of the same shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaTable {
    pub name: String,
    pub unit: String,
    pub rows: usize,
    pub cols: usize,
    /// Row-major `B − A`.
    pub deltas: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaSummary {
    pub changed_count: usize,
    pub total_cells: usize,
    /// `None` when no cell changed.
    pub mean_of_changed: Option<f64>,
    pub max_increase: Option<f64>,
    pub max_decrease: Option<f64>,
}

impl DeltaSummary {
    pub fn changed_percent(&self) -> f64 {
        if self.total_cells == 0 {
            return 0.0;
        }
        self.changed_count as f64 / self.total_cells as f64 * 100.0
    }
}

/// Magnitude class of a delta relative to the largest absolute delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaLevel {
    LargeDecrease,
    SmallDecrease,
    Unchanged,
    /// Non-zero but within 10% of the largest change.
    Slight,
    SmallIncrease,
    LargeIncrease,
}

impl DeltaLevel {
    pub fn classify(delta: f64, max_abs: f64) -> Self {
        if delta == 0.0 || max_abs == 0.0 {
            return Self::Unchanged;
        }
        let n = delta / max_abs;
        if n < -0.5 {
            Self::LargeDecrease
        } else if n < -0.1 {
            Self::SmallDecrease
        } else if n > 0.5 {
            Self::LargeIncrease
        } else if n > 0.1 {
            Self::SmallIncrease
        } else {
            Self::Slight
        }
    }
}

impl DeltaTable {
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(self.deltas[row * self.cols + col])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.deltas.chunks_exact(self.cols.max(1))
    }

    pub fn max_abs(&self) -> f64 {
        self.deltas.iter().fold(0.0, |m, d| m.max(d.abs()))
    }

    pub fn summarize(&self) -> DeltaSummary {
        summarize(self)
    }
}

/// `B − A` for every cell. Both tables must have the same shape.
pub fn diff(a: &Table, b: &Table) -> Result<DeltaTable, DiffError> {
    if a.rows() != b.rows() || a.cols() != b.cols() {
        return Err(DiffError::ShapeMismatch {
            rows_a: a.rows(),
            cols_a: a.cols(),
            rows_b: b.rows(),
            cols_b: b.cols(),
        });
    }
    let deltas = a
        .values()
        .iter()
        .zip(b.values())
        .map(|(va, vb)| vb - va)
        .collect();
    Ok(DeltaTable {
        name: a.descriptor().name.clone(),
        unit: a.descriptor().unit.clone(),
        rows: a.rows(),
        cols: a.cols(),
        deltas,
    })
}

/// Cells whose delta is exactly zero count as unchanged and are left out of
/// the mean and the extremes.
pub fn summarize(delta: &DeltaTable) -> DeltaSummary {
    let mut changed_count = 0;
    let mut sum = 0.0;
    let mut max_increase: Option<f64> = None;
    let mut max_decrease: Option<f64> = None;
    for &d in &delta.deltas {
        if d == 0.0 {
            continue;
        }
        changed_count += 1;
        sum += d;
        if d > 0.0 {
            max_increase = Some(max_increase.map_or(d, |m| m.max(d)));
        } else {
            max_decrease = Some(max_decrease.map_or(d, |m| m.min(d)));
        }
    }
    DeltaSummary {
        changed_count,
        total_cells: delta.deltas.len(),
        mean_of_changed: (changed_count > 0).then(|| sum / changed_count as f64),
        max_increase,
        max_decrease,
    }
}

/// Read `descriptor` from both images and diff them.
pub fn diff_images(
    image_a: &[u8],
    image_b: &[u8],
    descriptor: &TableDescriptor,
) -> Result<DeltaTable, DiffError> {
    let a = reader::read_table(image_a, descriptor)?;
    let b = reader::read_table(image_b, descriptor)?;
    diff(&a, &b)
}

/// Diff every table matching `filter` (`"all"` or a name substring).
pub fn diff_catalog<'c>(
    image_a: &[u8],
    image_b: &[u8],
    catalog: &'c Catalog,
    filter: &str,
) -> Vec<(&'c TableDescriptor, Result<DeltaTable, DiffError>)> {
    catalog
        .select(filter)
        .into_iter()
        .map(|d| {
            let result = diff_images(image_a, image_b, d);
            if let Err(e) = &result {
                log::warn!("Cannot compare {}: {}", d.name, e);
            }
            (d, result)
        })
        .collect()
}
