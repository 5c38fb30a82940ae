//! Plain-text renderings of tables, diffs, scan results and catalogs.

use calmap_core::axes;
use calmap_core::catalog::Catalog;
use calmap_core::descriptor::Table;
use calmap_diff::{DeltaLevel, DeltaSummary, DeltaTable};
use calmap_io::Patch;
use calmap_scan::AnnotatedCandidate;
use clap::ValueEnum;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DisplayMode {
    /// Numeric values
    Values,
    /// Two-character shade blocks, five levels
    #[default]
    Heatmap,
    /// Four-character symbols, four levels
    Symbols,
}

fn normalized(value: f64, min: f64, max: f64) -> Option<f64> {
    if max == min {
        return None;
    }
    Some((value - min) / (max - min))
}

fn heat_block(value: f64, min: f64, max: f64) -> &'static str {
    match normalized(value, min, max) {
        None => "  ",
        Some(n) if n < 0.2 => "··",
        Some(n) if n < 0.4 => "░░",
        Some(n) if n < 0.6 => "▒▒",
        Some(n) if n < 0.8 => "▓▓",
        Some(_) => "██",
    }
}

fn symbol(value: f64, min: f64, max: f64) -> char {
    match normalized(value, min, max) {
        None => '·',
        Some(n) if n < 0.25 => '░',
        Some(n) if n < 0.5 => '▒',
        Some(n) if n < 0.75 => '▓',
        Some(_) => '█',
    }
}

fn axis_header(out: &mut String, cols: usize, width: usize, right_align: bool) {
    out.push_str("    RPM → |");
    for rpm in axes::rpm_axis(cols) {
        if right_align {
            let _ = write!(out, "{:>width$}", rpm, width = width);
        } else {
            let _ = write!(out, "{:<width$}", rpm, width = width);
        }
    }
    out.push('\n');
    let _ = writeln!(out, "  Load%  |{}", "-".repeat(cols * width));
}

/// Title line: name, offset, shape and value range.
pub fn table_title(table: &Table) -> String {
    let d = table.descriptor();
    let (min, max) = table.min_max();
    format!(
        "{} | Offset: 0x{:04X} | {}x{} | Range: {:.2}-{:.2} {}",
        d.name, d.offset, d.rows, d.cols, min, max, d.unit
    )
}

pub fn render_table(table: &Table, mode: DisplayMode, verbose: bool) -> String {
    let d = table.descriptor();
    let (min, max) = table.min_max();
    let mut out = String::new();
    let _ = writeln!(out, "{}", table_title(table));
    if !d.description.is_empty() {
        let _ = writeln!(out, "{}", d.description);
    }

    let width = if mode == DisplayMode::Values { 6 } else { 4 };
    axis_header(&mut out, d.cols, width, mode == DisplayMode::Values);

    for (load, row) in axes::load_axis(d.rows).into_iter().zip(table.iter_rows()) {
        let _ = write!(out, "   {:>3} ↓ |", load);
        for &v in row {
            match mode {
                DisplayMode::Values => {
                    let _ = write!(out, "{:>6.2}", v);
                }
                DisplayMode::Heatmap => {
                    out.push_str(heat_block(v, min, max));
                    out.push_str("  ");
                }
                DisplayMode::Symbols => {
                    let s = symbol(v, min, max);
                    for _ in 0..4 {
                        out.push(s);
                    }
                }
            }
        }
        out.push('\n');
    }

    match mode {
        DisplayMode::Heatmap => {
            out.push_str("\nHeatmap: ·· Very Low  ░░ Low  ▒▒ Medium  ▓▓ High  ██ Very High\n");
        }
        DisplayMode::Symbols => {
            out.push_str("\nLegend: ░ Low  ▒ Med  ▓ High  █ Max\n");
        }
        DisplayMode::Values => {}
    }

    if verbose {
        let digits = d.format.width() * 2;
        out.push_str("\nRaw values:\n");
        for r in 0..d.rows {
            let _ = write!(out, "   {:>3}   |", r);
            for c in 0..d.cols {
                let raw = table.raw_at(r, c).unwrap_or_default();
                let _ = write!(out, " {:0digits$X}", raw, digits = digits);
            }
            out.push('\n');
        }
    }
    out
}

fn delta_symbol(level: DeltaLevel) -> &'static str {
    match level {
        DeltaLevel::LargeDecrease => "▼▼ ",
        DeltaLevel::SmallDecrease => "▼  ",
        DeltaLevel::Unchanged => "·· ",
        DeltaLevel::Slight => "·  ",
        DeltaLevel::SmallIncrease => "▲  ",
        DeltaLevel::LargeIncrease => "▲▲ ",
    }
}

fn opt(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.2} {}", v, unit),
        None => "n/a".to_string(),
    }
}

pub fn render_summary(delta: &DeltaTable, summary: &DeltaSummary) -> String {
    format!(
        "Changed cells: {} / {} ({:.1}%)\nAverage change: {}\nMax increase: {}\nMax decrease: {}\n",
        summary.changed_count,
        summary.total_cells,
        summary.changed_percent(),
        opt(summary.mean_of_changed, &delta.unit),
        opt(summary.max_increase, &delta.unit),
        opt(summary.max_decrease, &delta.unit),
    )
}

/// Difference map of `B − A` on the derived axes.
pub fn render_delta(delta: &DeltaTable) -> String {
    let max_abs = delta.max_abs();
    let mut out = String::new();
    out.push_str("Difference Map (B - A):\n");
    out.push_str("    RPM → |");
    for rpm in axes::rpm_axis(delta.cols) {
        let _ = write!(out, "{:<6}", rpm);
    }
    out.push('\n');
    let _ = writeln!(out, "  Load%  |{}", "-".repeat(delta.cols * 6));
    for (load, row) in axes::load_axis(delta.rows).into_iter().zip(delta.iter_rows()) {
        let _ = write!(out, "   {:>3} ↓ |", load);
        for &d in row {
            out.push_str(delta_symbol(DeltaLevel::classify(d, max_abs)));
        }
        out.push('\n');
    }
    out.push_str("\nLegend: ▼▼ Large Decrease  ▼ Small Decrease  ·· No Change  ▲ Small Increase  ▲▲ Large Increase\n");
    out
}

pub fn render_catalog(catalog: &Catalog, with_params: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<24} {:<8} {:<7} {:<8} {:<6} Description", "Name", "Offset", "Size", "Type", "Unit");
    for d in catalog.tables() {
        let _ = writeln!(
            out,
            "{:<24} 0x{:04X}   {:<7} {:<8} {:<6} {}",
            d.name,
            d.offset,
            format!("{}x{}", d.rows, d.cols),
            d.format.to_string(),
            d.unit,
            d.description
        );
    }
    if with_params {
        out.push('\n');
        let _ = writeln!(out, "{:<24} {:<8} {:<16} {:<6} Description", "Parameter", "Offset", "Range", "Unit");
        for p in catalog.params() {
            let _ = writeln!(
                out,
                "{:<24} 0x{:04X}   {:<16} {:<6} {}",
                p.name,
                p.offset,
                format!("{}-{}", p.min, p.max),
                p.unit,
                p.description
            );
        }
    }
    out
}

pub fn render_candidates(found: &[AnnotatedCandidate]) -> String {
    if found.is_empty() {
        return "No potential maps found\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8} {:<6} {:<10} {:>6} {:>6} {:>10}  {:<28} Known",
        "Offset", "Size", "Type", "Min", "Max", "Variance", "Preview"
    );
    for a in found {
        let c = &a.candidate;
        let _ = writeln!(
            out,
            "0x{:04X}   {:<6} {:<10} {:>6.0} {:>6.0} {:>10.1}  {:<28} {}",
            c.offset,
            format!("{}x{}", c.rows, c.cols),
            c.format.to_string(),
            c.min,
            c.max,
            c.variance,
            c.preview,
            a.known.as_deref().unwrap_or("")
        );
    }
    let _ = writeln!(out, "\nFound {} potential map(s)", found.len());
    out
}

pub fn render_patches(patches: &[Patch]) -> String {
    let mut out = String::new();
    for p in patches {
        let shown: Vec<String> = p.bytes.iter().take(16).map(|b| format!("{:02X}", b)).collect();
        let _ = writeln!(
            out,
            "  0x{:04X}: {} byte(s) [{}{}]",
            p.offset,
            p.bytes.len(),
            shown.join(" "),
            if p.bytes.len() > 16 { " ..." } else { "" }
        );
    }
    out
}
