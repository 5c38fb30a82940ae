//! Table export to CSV/TSV and the matching import parser.
//!
//! Layout:
//!
//! ```text
//! # Main Fuel Map
//! # Offset: 0x6700
//! # Size: 8x16
//! # Unit: ms
//!
//! Load\RPM,0,500,1000,...
//! 0%,4.00,4.00,...
//! ```

use calmap_core::axes;
use calmap_core::descriptor::Table;
use std::io;
use std::path::Path;
use thiserror::Error;

pub const HEADER_MARKER: &str = "Load\\RPM";

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("No '{}' header row found", HEADER_MARKER)]
    MissingHeader,
    #[error("Line {line}: cannot parse '{value}' as a number")]
    BadValue { line: usize, value: String },
    #[error("Line {line}: expected {expected} values, found {found}")]
    Ragged {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("No data rows after the header")]
    Empty,
}

/// Field separator for a target path: `,` for `.csv`, tab otherwise.
pub fn separator_for(path: &Path) -> char {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => ',',
        _ => '\t',
    }
}

/// `"Main Fuel Map"` → `"main_fuel_map.csv"`.
pub fn export_file_name(table_name: &str) -> String {
    let stem: String = table_name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .collect();
    format!("{}.csv", stem)
}

pub fn export_table(table: &Table, sep: char) -> String {
    let d = table.descriptor();
    let mut out = String::new();
    out.push_str(&format!("# {}\n", d.name));
    out.push_str(&format!("# Offset: 0x{:04X}\n", d.offset));
    out.push_str(&format!("# Size: {}x{}\n", d.rows, d.cols));
    out.push_str(&format!("# Unit: {}\n", d.unit));
    out.push('\n');

    out.push_str(HEADER_MARKER);
    for rpm in axes::rpm_axis(d.cols) {
        out.push(sep);
        out.push_str(&rpm.to_string());
    }
    out.push('\n');

    for (load, row) in axes::load_axis(d.rows).into_iter().zip(table.iter_rows()) {
        out.push_str(&format!("{}%", load));
        for v in row {
            out.push(sep);
            out.push_str(&format!("{:.2}", v));
        }
        out.push('\n');
    }
    out
}

pub fn write_table_file(table: &Table, path: &Path) -> io::Result<()> {
    std::fs::write(path, export_table(table, separator_for(path)))
}

/// A grid read back from an exported file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedGrid {
    /// Table name from the leading `# <name>` comment, if present.
    pub name: Option<String>,
    pub rows: Vec<Vec<f64>>,
}

fn is_metadata(comment: &str) -> bool {
    ["Offset:", "Size:", "Unit:"]
        .iter()
        .any(|k| comment.starts_with(k))
}

/// Parse an exported table. The separator is taken from the header row.
pub fn parse_grid(text: &str) -> Result<ImportedGrid, ImportError> {
    let mut name = None;
    let mut lines = text.lines().enumerate();

    let sep = loop {
        let (_, line) = lines.next().ok_or(ImportError::MissingHeader)?;
        let line = line.trim_end_matches('\r');
        if let Some(comment) = line.strip_prefix('#') {
            let comment = comment.trim();
            if name.is_none() && !is_metadata(comment) && !comment.is_empty() {
                name = Some(comment.to_string());
            }
            continue;
        }
        if line.starts_with(HEADER_MARKER) {
            break if line.contains('\t') { '\t' } else { ',' };
        }
    };

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (idx, line) in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split(sep)
            .skip(1)
            .map(|field| {
                let field = field.trim();
                field.parse::<f64>().map_err(|_| ImportError::BadValue {
                    line: idx + 1,
                    value: field.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        if let Some(first) = rows.first() {
            if values.len() != first.len() {
                return Err(ImportError::Ragged {
                    line: idx + 1,
                    expected: first.len(),
                    found: values.len(),
                });
            }
        }
        rows.push(values);
    }

    if rows.is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(ImportedGrid { name, rows })
}

pub fn read_grid_file(path: &Path) -> Result<ImportedGrid, ImportError> {
    let text = std::fs::read_to_string(path)?;
    parse_grid(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calmap_core::descriptor::TableDescriptor;
    use calmap_core::enums::StorageFormat;

    fn table() -> Table {
        let d = TableDescriptor {
            name: "Ignition Timing Map".into(),
            offset: 0x6780,
            rows: 2,
            cols: 4,
            format: StorageFormat::U8,
            scale: 0.75,
            bias: -24.0,
            unit: "deg".into(),
            description: String::new(),
        };
        Table::from_raw(d, vec![32, 40, 48, 56, 0, 10, 20, 255])
    }

    #[test]
    fn test_export_layout() {
        let text = export_table(&table(), ',');
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# Ignition Timing Map");
        assert_eq!(lines[1], "# Offset: 0x6780");
        assert_eq!(lines[2], "# Size: 2x4");
        assert_eq!(lines[3], "# Unit: deg");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "Load\\RPM,0,2000,4000,6000");
        assert_eq!(lines[6], "0%,0.00,6.00,12.00,18.00");
        assert_eq!(lines[7], "50%,-24.00,-16.50,-9.00,167.25");
    }

    #[test]
    fn test_import_reads_export() {
        for sep in [',', '\t'] {
            let grid = parse_grid(&export_table(&table(), sep)).unwrap();
            assert_eq!(grid.name.as_deref(), Some("Ignition Timing Map"));
            assert_eq!(grid.rows, table().to_grid());
        }
    }

    #[test]
    fn test_import_errors() {
        assert!(matches!(parse_grid("# only\n1,2\n"), Err(ImportError::MissingHeader)));
        assert!(matches!(
            parse_grid("Load\\RPM,0,1\n0%,1.0,x\n"),
            Err(ImportError::BadValue { line: 2, .. })
        ));
        assert!(matches!(
            parse_grid("Load\\RPM,0,1\n0%,1,2\n50%,1\n"),
            Err(ImportError::Ragged { line: 3, expected: 2, found: 1 })
        ));
        assert!(matches!(parse_grid("Load\\RPM,0,1\n\n"), Err(ImportError::Empty)));
    }

    #[test]
    fn test_file_names_and_separators() {
        assert_eq!(export_file_name("Main Fuel Map"), "main_fuel_map.csv");
        assert_eq!(export_file_name("Fuel/Timing Trim 1"), "fuel_timing_trim_1.csv");
        assert_eq!(separator_for(Path::new("a.CSV")), ',');
        assert_eq!(separator_for(Path::new("a.tsv")), '\t');
        assert_eq!(separator_for(Path::new("a")), '\t');
    }
}
