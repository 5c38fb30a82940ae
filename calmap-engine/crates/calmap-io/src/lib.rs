//! Firmware image I/O: the backup-guarded image store, table reader, and
//! validated editor.

pub mod backup;
pub mod editor;
pub mod image;
pub mod reader;

pub use backup::*;
pub use editor::*;
pub use image::*;
pub use reader::*;
