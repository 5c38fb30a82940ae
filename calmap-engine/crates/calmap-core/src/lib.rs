//! Calibration map core types: storage formats, the raw↔physical codec,
//! table/parameter descriptors, and the descriptor catalog.
//!
//! Nothing in this crate touches the file system except catalog loading;
//! images are plain byte slices here.

pub mod axes;
pub mod catalog;
pub mod codec;
pub mod descriptor;
pub mod enums;

pub use axes::*;
pub use catalog::*;
pub use codec::*;
pub use descriptor::*;
pub use enums::*;
