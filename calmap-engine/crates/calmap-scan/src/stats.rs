//! Summary statistics over a window of decoded values.

/// Min, max, mean and population variance of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
}

impl WindowStats {
    /// `None` for an empty sample.
    pub fn compute(values: &[f64]) -> Option<Self> {
        let first = *values.first()?;
        let mut min = first;
        let mut max = first;
        let mut sum = 0.0;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let n = values.len() as f64;
        let mean = sum / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            min,
            max,
            mean,
            variance,
        })
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}
