//! Sliding-window table scanner.

use crate::stats::WindowStats;
use calmap_core::catalog::Catalog;
use calmap_core::codec;
use calmap_core::enums::StorageFormat;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

// ─── Options ────────────────────────────────────────────────────────────────

/// Table shape tried by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }
}

pub const DEFAULT_SHAPES: [Shape; 3] = [Shape::new(8, 8), Shape::new(8, 16), Shape::new(16, 16)];
pub const DEFAULT_STEP: usize = 0x40;

/// A single (shape, format) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHypothesis {
    pub shape: Shape,
    pub format: StorageFormat,
}

impl ScanHypothesis {
    pub fn window_len(&self) -> usize {
        self.shape.cells() * self.format.width()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub shapes: Vec<Shape>,
    pub formats: Vec<StorageFormat>,
    pub step: usize,
    /// Minimum `max - min` for 8-bit windows.
    pub threshold_8bit: f64,
    /// Minimum `max - min` for 16-bit windows.
    pub threshold_16bit: f64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            shapes: DEFAULT_SHAPES.to_vec(),
            formats: StorageFormat::ALL.to_vec(),
            step: DEFAULT_STEP,
            threshold_8bit: 10.0,
            threshold_16bit: 100.0,
        }
    }
}

impl ScanOptions {
    /// Hypotheses in scan order: shapes outer, formats inner.
    pub fn hypotheses(&self) -> Vec<ScanHypothesis> {
        self.shapes
            .iter()
            .flat_map(|&shape| {
                self.formats
                    .iter()
                    .map(move |&format| ScanHypothesis { shape, format })
            })
            .collect()
    }

    pub fn threshold(&self, format: StorageFormat) -> f64 {
        match format.width() {
            1 => self.threshold_8bit,
            _ => self.threshold_16bit,
        }
    }
}

// ─── Candidates ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanCandidate {
    pub offset: u64,
    pub rows: usize,
    pub cols: usize,
    pub format: StorageFormat,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
    pub preview: String,
}

impl ScanCandidate {
    pub fn byte_len(&self) -> usize {
        self.rows * self.cols * self.format.width()
    }
}

/// A candidate together with the catalog table it lands on, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedCandidate {
    #[serde(flatten)]
    pub candidate: ScanCandidate,
    pub known: Option<String>,
}

fn preview(window: &[u8], format: StorageFormat) -> String {
    let mut out = String::new();
    match format {
        StorageFormat::U8 => {
            for b in window.iter().take(8) {
                let _ = write!(out, "{:02X} ", b);
            }
        }
        _ => {
            for cell in window.chunks_exact(2).take(4) {
                let _ = write!(out, "{:04X} ", codec::decode_raw(cell, format));
            }
        }
    }
    out.push_str("...");
    out
}

/// Evaluate one window; `Some` when it looks like a table.
pub fn evaluate_window(
    image: &[u8],
    offset: usize,
    hypothesis: ScanHypothesis,
    threshold: f64,
) -> Option<ScanCandidate> {
    let window = image.get(offset..offset + hypothesis.window_len())?;
    let values: Vec<f64> = window
        .chunks_exact(hypothesis.format.width())
        .map(|cell| codec::decode_raw(cell, hypothesis.format) as f64)
        .collect();
    let stats = WindowStats::compute(&values)?;
    if stats.range() < threshold || stats.max <= 0.0 {
        return None;
    }
    Some(ScanCandidate {
        offset: offset as u64,
        rows: hypothesis.shape.rows,
        cols: hypothesis.shape.cols,
        format: hypothesis.format,
        min: stats.min,
        max: stats.max,
        mean: stats.mean,
        variance: stats.variance,
        preview: preview(window, hypothesis.format),
    })
}

/// Scan the whole image. Candidates come back in scan order: hypothesis by
/// hypothesis, ascending offset within each.
pub fn scan(image: &[u8], options: &ScanOptions) -> Vec<ScanCandidate> {
    let step = options.step.max(1);
    let mut out = Vec::new();
    for hypothesis in options.hypotheses() {
        let len = hypothesis.window_len();
        if len == 0 || len > image.len() {
            continue;
        }
        let threshold = options.threshold(hypothesis.format);
        let before = out.len();
        out.extend(
            (0..=image.len() - len)
                .step_by(step)
                .filter_map(|offset| evaluate_window(image, offset, hypothesis, threshold)),
        );
        log::debug!(
            "{}x{} {}: {} candidate(s)",
            hypothesis.shape.rows,
            hypothesis.shape.cols,
            hypothesis.format,
            out.len() - before
        );
    }
    out
}

/// Drop candidates that overlap a table the catalog already knows.
pub fn filter_known(candidates: Vec<ScanCandidate>, catalog: &Catalog) -> Vec<ScanCandidate> {
    candidates
        .into_iter()
        .filter(|c| catalog.overlapping(c.offset, c.byte_len()).is_none())
        .collect()
}

pub fn annotate_known(candidates: Vec<ScanCandidate>, catalog: &Catalog) -> Vec<AnnotatedCandidate> {
    candidates
        .into_iter()
        .map(|candidate| {
            let known = catalog
                .overlapping(candidate.offset, candidate.byte_len())
                .map(|d| d.name.clone());
            AnnotatedCandidate { candidate, known }
        })
        .collect()
}
