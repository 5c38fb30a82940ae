//! Heuristic discovery of calibration tables in an image.
//!
//! The scanner slides fixed-shape windows over the image and keeps those
//! whose values spread enough to look like a map rather than code or padding.

pub mod scanner;
pub mod stats;

pub use scanner::*;
pub use stats::*;
