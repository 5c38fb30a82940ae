//! Table reader: decode tables and scalar parameters from an image.

use calmap_core::catalog::Catalog;
use calmap_core::codec;
use calmap_core::descriptor::{ConfigParameter, Table, TableDescriptor};
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{name}: offset 0x{offset:X} is outside the image ({image_len} bytes)")]
    OffsetOutOfBounds {
        name: String,
        offset: u64,
        image_len: usize,
    },
    #[error("{name}: data truncated, expected {expected} bytes at 0x{offset:X}, got {got}")]
    Truncated {
        name: String,
        offset: u64,
        expected: usize,
        got: usize,
    },
}

/// The `len` bytes at `offset`, or the reason they are not all there.
pub fn region<'a>(image: &'a [u8], name: &str, offset: u64, len: usize) -> Result<&'a [u8], ReadError> {
    let start = match usize::try_from(offset) {
        Ok(start) if start < image.len() => start,
        _ => {
            return Err(ReadError::OffsetOutOfBounds {
                name: name.to_string(),
                offset,
                image_len: image.len(),
            })
        }
    };
    let available = image.len() - start;
    if len > available {
        return Err(ReadError::Truncated {
            name: name.to_string(),
            offset,
            expected: len,
            got: available,
        });
    }
    Ok(&image[start..start + len])
}

/// Decode a whole table, row-major. Never returns a partial table.
pub fn read_table(image: &[u8], descriptor: &TableDescriptor) -> Result<Table, ReadError> {
    let bytes = region(image, &descriptor.name, descriptor.offset, descriptor.byte_len())?;
    let width = descriptor.format.width();
    let raw = bytes
        .chunks_exact(width)
        .map(|cell| codec::decode_raw(cell, descriptor.format))
        .collect();
    Ok(Table::from_raw(descriptor.clone(), raw))
}

pub fn read_raw_scalar(image: &[u8], param: &ConfigParameter) -> Result<u32, ReadError> {
    let bytes = region(image, &param.name, param.offset, param.format.width())?;
    Ok(codec::decode_raw(bytes, param.format))
}

/// Decode one configuration parameter to its physical value.
pub fn read_scalar(image: &[u8], param: &ConfigParameter) -> Result<f64, ReadError> {
    let raw = read_raw_scalar(image, param)?;
    Ok(codec::raw_to_physical(raw, param.scale, param.bias))
}

/// Read every catalog table, keeping each table's own outcome.
pub fn read_all<'c>(
    image: &[u8],
    catalog: &'c Catalog,
) -> Vec<(&'c TableDescriptor, Result<Table, ReadError>)> {
    catalog
        .tables()
        .iter()
        .map(|d| {
            let result = read_table(image, d);
            if let Err(e) = &result {
                log::warn!("Skipping {}: {}", d.name, e);
            }
            (d, result)
        })
        .collect()
}

/// Read a table straight from an image file.
pub fn read_table_file(path: &Path, descriptor: &TableDescriptor) -> Result<Table, ReadError> {
    let image = std::fs::read(path)?;
    read_table(&image, descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calmap_core::enums::StorageFormat;

    fn descriptor(offset: u64, rows: usize, cols: usize, format: StorageFormat) -> TableDescriptor {
        TableDescriptor {
            name: "Test Map".into(),
            offset,
            rows,
            cols,
            format,
            scale: 0.04,
            bias: 0.0,
            unit: "ms".into(),
            description: String::new(),
        }
    }

    #[test]
    fn test_read_table_row_major() {
        let mut image = vec![0u8; 64];
        for (i, b) in image[16..22].iter_mut().enumerate() {
            *b = i as u8 * 25;
        }
        let t = read_table(&image, &descriptor(16, 2, 3, StorageFormat::U8)).unwrap();
        assert_eq!(t.raw_values(), &[0, 25, 50, 75, 100, 125]);
        assert!((t.get(1, 1).unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_read_table_u16_orders() {
        let image = [0x01u8, 0x02, 0x03, 0x04];
        let le = read_table(&image, &descriptor(0, 1, 2, StorageFormat::U16Le)).unwrap();
        let be = read_table(&image, &descriptor(0, 1, 2, StorageFormat::U16Be)).unwrap();
        assert_eq!(le.raw_values(), &[0x0201, 0x0403]);
        assert_eq!(be.raw_values(), &[0x0102, 0x0304]);
    }

    #[test]
    fn test_read_table_last_byte_boundary() {
        let image = vec![1u8; 0x100];
        // Last byte of the table is image[0xFF].
        assert!(read_table(&image, &descriptor(0xF0, 2, 8, StorageFormat::U8)).is_ok());
        // One byte more than available.
        let err = read_table(&image, &descriptor(0xF1, 2, 8, StorageFormat::U8)).unwrap_err();
        assert!(matches!(err, ReadError::Truncated { expected: 16, got: 15, .. }));
    }

    #[test]
    fn test_read_table_offset_out_of_bounds() {
        let image = vec![0u8; 32];
        let err = read_table(&image, &descriptor(32, 1, 1, StorageFormat::U8)).unwrap_err();
        assert!(matches!(err, ReadError::OffsetOutOfBounds { offset: 32, image_len: 32, .. }));
        let err = read_table(&image, &descriptor(u64::MAX, 1, 1, StorageFormat::U8)).unwrap_err();
        assert!(matches!(err, ReadError::OffsetOutOfBounds { .. }));
    }

    #[test]
    fn test_read_scalar() {
        let mut image = vec![0u8; 0x7004];
        image[0x7001] = 82;
        let param = ConfigParameter {
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
        assert!((read_scalar(&image, &param).unwrap() - 820.0).abs() < 1e-9);

        let short = vec![0u8; 0x7000];
        assert!(matches!(
            read_scalar(&short, &param),
            Err(ReadError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_read_all_keeps_failures() {
        let catalog = Catalog::preset(calmap_core::catalog::CatalogPreset::M21);
        let image = vec![0u8; 0x6800];
        let results = read_all(&image, &catalog);
        assert_eq!(results.len(), catalog.tables().len());
        let fuel = results.iter().find(|(d, _)| d.name == "Main Fuel Map").unwrap();
        assert!(fuel.1.is_ok());
        let lambda = results.iter().find(|(d, _)| d.name == "Lambda Target Map").unwrap();
        assert!(lambda.1.is_err());
    }
}
