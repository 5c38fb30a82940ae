//! Table and parameter descriptors, and the materialized `Table`.

use crate::codec::{self, CodecError};
use crate::enums::StorageFormat;
use serde::{Deserialize, Serialize};

// ─── Table descriptor ───────────────────────────────────────────────────────

/// Static description of a calibration table embedded at a fixed offset.
///
/// Whether the table fits inside a given image is only known at read time;
/// constructing a descriptor never looks at an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub offset: u64,
    pub rows: usize,
    pub cols: usize,
    pub format: StorageFormat,
    pub scale: f64,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

impl TableDescriptor {
    /// Saturates at `usize::MAX`; such a table never fits an image.
    pub fn cell_count(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Bytes occupied in the image, saturating like `cell_count`.
    pub fn byte_len(&self) -> usize {
        self.cell_count().saturating_mul(self.format.width())
    }

    /// One past the last byte of the table; `None` when that address
    /// does not fit in a `u64`.
    pub fn end(&self) -> Option<u64> {
        let len = u64::try_from(self.byte_len()).ok()?;
        self.offset.checked_add(len)
    }

    pub fn contains_cell(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Absolute offset of cell `(row, col)`; `None` outside the grid or
    /// when the address overflows.
    pub fn cell_offset(&self, row: usize, col: usize) -> Option<u64> {
        if !self.contains_cell(row, col) {
            return None;
        }
        let index = row.checked_mul(self.cols)?.checked_add(col)?;
        let rel = index.checked_mul(self.format.width())?;
        self.offset.checked_add(u64::try_from(rel).ok()?)
    }

    /// True when `[start, start + len)` shares at least one byte with this table.
    pub fn overlaps(&self, start: u64, len: usize) -> bool {
        if len == 0 || self.byte_len() == 0 {
            return false;
        }
        let end = start.saturating_add(len as u64);
        let table_end = self.end().unwrap_or(u64::MAX);
        start < table_end && self.offset < end
    }

    pub fn decode_cell(&self, bytes: &[u8]) -> f64 {
        codec::decode(bytes, self.format, self.scale, self.bias)
    }

    pub fn encode_cell(&self, physical: f64) -> Result<Vec<u8>, CodecError> {
        codec::encode(physical, self.format, self.scale, self.bias)
    }

    /// Rejects descriptors that can never decode anything meaningful.
    pub fn check(&self) -> Result<(), String> {
        if self.rows == 0 || self.cols == 0 {
            return Err(format!("{}: table has no cells ({}x{})", self.name, self.rows, self.cols));
        }
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(format!("{}: scale must be finite and non-zero", self.name));
        }
        if !self.bias.is_finite() {
            return Err(format!("{}: bias must be finite", self.name));
        }
        let fits = self
            .rows
            .checked_mul(self.cols)
            .and_then(|n| n.checked_mul(self.format.width()))
            .and_then(|len| u64::try_from(len).ok())
            .and_then(|len| self.offset.checked_add(len))
            .is_some();
        if !fits {
            return Err(format!(
                "{}: {}x{} table at 0x{:X} exceeds the address space",
                self.name, self.rows, self.cols, self.offset
            ));
        }
        Ok(())
    }
}

// ─── Configuration parameter ────────────────────────────────────────────────

/// A single scalar setting, validated against `[min, max]` before any write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigParameter {
    pub name: String,
    pub offset: u64,
    pub format: StorageFormat,
    pub scale: f64,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
    pub min: f64,
    pub max: f64,
}

impl ConfigParameter {
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// The parameter seen as a 1×1 table.
    pub fn as_table(&self) -> TableDescriptor {
        TableDescriptor {
            name: self.name.clone(),
            offset: self.offset,
            rows: 1,
            cols: 1,
            format: self.format,
            scale: self.scale,
            bias: self.bias,
            unit: self.unit.clone(),
            description: self.description.clone(),
        }
    }

    pub fn check(&self) -> Result<(), String> {
        self.as_table().check()?;
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(format!(
                "{}: invalid range [{}, {}]",
                self.name, self.min, self.max
            ));
        }
        Ok(())
    }
}

// ─── Materialized table ─────────────────────────────────────────────────────

/// A decoded table: `rows × cols` physical values in row-major order, plus the
/// raw integers they were decoded from.
///
/// Immutable; edits go through the editor against the image and are observed
/// by reading the table again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    descriptor: TableDescriptor,
    values: Vec<f64>,
    raw: Vec<u32>,
}

impl Table {
    /// Build a table from raw cell integers. `raw.len()` must equal the
    /// descriptor's cell count.
    pub fn from_raw(descriptor: TableDescriptor, raw: Vec<u32>) -> Self {
        assert_eq!(
            raw.len(),
            descriptor.cell_count(),
            "Table::from_raw: cell count mismatch for {}",
            descriptor.name
        );
        let values = raw
            .iter()
            .map(|&r| codec::raw_to_physical(r, descriptor.scale, descriptor.bias))
            .collect();
        Self {
            descriptor,
            values,
            raw,
        }
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    pub fn rows(&self) -> usize {
        self.descriptor.rows
    }

    pub fn cols(&self) -> usize {
        self.descriptor.cols
    }

    /// All physical values, row-major.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn raw_values(&self) -> &[u32] {
        &self.raw
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        Some(self.values[row * self.cols() + col])
    }

    pub fn raw_at(&self, row: usize, col: usize) -> Option<u32> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        Some(self.raw[row * self.cols() + col])
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let cols = self.cols();
        &self.values[row * cols..(row + 1) * cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.cols())
    }

    /// Nested `Vec` copy, one inner vector per row.
    pub fn to_grid(&self) -> Vec<Vec<f64>> {
        self.iter_rows().map(|r| r.to_vec()).collect()
    }

    pub fn min_max(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in &self.values {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fuel() -> TableDescriptor {
        TableDescriptor {
            name: "Main Fuel Map".into(),
            offset: 0x6700,
            rows: 8,
            cols: 16,
            format: StorageFormat::U8,
            scale: 0.04,
            bias: 0.0,
            unit: "ms".into(),
            description: String::new(),
        }
    }

    #[test]
    fn test_geometry() {
        let d = fuel();
        assert_eq!(d.cell_count(), 128);
        assert_eq!(d.byte_len(), 128);
        assert_eq!(d.end(), Some(0x6780));
        assert_eq!(d.cell_offset(1, 2), Some(0x6700 + 18));
        assert_eq!(d.cell_offset(8, 0), None);
        assert_eq!(d.cell_offset(0, 16), None);
    }

    #[test]
    fn test_cell_offset_wide() {
        let d = TableDescriptor {
            format: StorageFormat::U16Be,
            ..fuel()
        };
        assert_eq!(d.byte_len(), 256);
        assert_eq!(d.cell_offset(1, 1), Some(0x6700 + 34));
    }

    #[test]
    fn test_overlaps() {
        let d = fuel();
        assert!(d.overlaps(0x66C0, 0x41));
        assert!(!d.overlaps(0x66C0, 0x40));
        assert!(d.overlaps(0x677F, 1));
        assert!(!d.overlaps(0x6780, 64));
    }

    #[test]
    fn test_check_rejects_zero_scale() {
        let d = TableDescriptor { scale: 0.0, ..fuel() };
        assert!(d.check().is_err());
        let d = TableDescriptor { rows: 0, ..fuel() };
        assert!(d.check().is_err());
        assert!(fuel().check().is_ok());
    }

    #[test]
    fn test_address_overflow() {
        let d = TableDescriptor {
            offset: u64::MAX,
            rows: 1,
            cols: 2,
            ..fuel()
        };
        assert_eq!(d.cell_offset(0, 0), Some(u64::MAX));
        assert_eq!(d.cell_offset(0, 1), None);
        assert_eq!(d.end(), None);
        assert!(d.overlaps(u64::MAX, 1));
        assert!(d.check().is_err());

        let d = TableDescriptor {
            rows: usize::MAX,
            cols: 2,
            ..fuel()
        };
        assert_eq!(d.byte_len(), usize::MAX);
        assert!(d.check().is_err());
        assert!(TableDescriptor { offset: u64::MAX - 128, ..fuel() }.check().is_ok());
    }

    #[test]
    fn test_param_range_and_table_view() {
        let p = ConfigParameter {
            name: "Idle Speed Target".into(),
            offset: 0x7001,
            format: StorageFormat::U8,
            scale: 10.0,
            bias: 0.0,
            unit: "RPM".into(),
            description: String::new(),
            min: 650.0,
            max: 1100.0,
        };
        assert!(p.in_range(650.0));
        assert!(p.in_range(1100.0));
        assert!(!p.in_range(649.0));
        assert!(!p.in_range(1101.0));
        let t = p.as_table();
        assert_eq!(t.cell_count(), 1);
        assert_eq!(t.offset, 0x7001);
    }

    #[test]
    fn test_table_from_raw() {
        let mut d = fuel();
        d.rows = 2;
        d.cols = 2;
        let t = Table::from_raw(d, vec![100, 101, 102, 103]);
        assert!((t.get(0, 0).unwrap() - 4.0).abs() < 1e-9);
        assert!((t.get(1, 1).unwrap() - 4.12).abs() < 1e-9);
        assert_eq!(t.raw_at(1, 0), Some(102));
        assert_eq!(t.get(2, 0), None);
        assert_eq!(t.iter_rows().count(), 2);
        assert_eq!(t.row(1).len(), 2);
        let (min, max) = t.min_max();
        assert!((min - 4.0).abs() < 1e-9);
        assert!((max - 4.12).abs() < 1e-9);
    }
}
