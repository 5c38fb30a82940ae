//! Cell-wise comparison of calibration tables.

pub mod differ;

pub use differ::*;
