//! Enumerations for cell storage: byte order and storage format.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Byte order ─────────────────────────────────────────────────────────────

/// Byte order of a multi-byte cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => write!(f, "LE"),
            Self::Big => write!(f, "BE"),
        }
    }
}

// ─── Storage format ─────────────────────────────────────────────────────────

/// How one cell is stored in the image.
///
/// Width and byte order travel together so that a 1-byte cell can never carry
/// a meaningless byte order and an unknown width cannot be expressed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageFormat {
    /// Unsigned 8-bit.
    #[serde(rename = "u8")]
    U8,
    /// Unsigned 16-bit, little-endian.
    #[serde(rename = "u16le")]
    U16Le,
    /// Unsigned 16-bit, big-endian.
    #[serde(rename = "u16be")]
    U16Be,
}

impl StorageFormat {
    /// Every supported format, in scan order.
    pub const ALL: [StorageFormat; 3] = [Self::U8, Self::U16Le, Self::U16Be];

    /// Cell width in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16Le | Self::U16Be => 2,
        }
    }

    /// Byte order, or `None` for single-byte cells.
    pub fn endian(self) -> Option<Endian> {
        match self {
            Self::U8 => None,
            Self::U16Le => Some(Endian::Little),
            Self::U16Be => Some(Endian::Big),
        }
    }

    /// Largest raw integer the format can hold.
    pub fn max_raw(self) -> u32 {
        match self {
            Self::U8 => u8::MAX as u32,
            Self::U16Le | Self::U16Be => u16::MAX as u32,
        }
    }

    /// Short tag used in catalog files and on the command line.
    pub fn tag(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16Le => "u16le",
            Self::U16Be => "u16be",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Some(Self::U8),
            "u16le" | "uint16" | "u16" => Some(Self::U16Le),
            "u16be" => Some(Self::U16Be),
            _ => None,
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "uint8"),
            Self::U16Le => write!(f, "uint16 LE"),
            Self::U16Be => write!(f, "uint16 BE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_and_endian() {
        assert_eq!(StorageFormat::U8.width(), 1);
        assert_eq!(StorageFormat::U8.endian(), None);
        assert_eq!(StorageFormat::U16Le.width(), 2);
        assert_eq!(StorageFormat::U16Le.endian(), Some(Endian::Little));
        assert_eq!(StorageFormat::U16Be.endian(), Some(Endian::Big));
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(StorageFormat::from_tag("u8"), Some(StorageFormat::U8));
        assert_eq!(StorageFormat::from_tag("UINT16"), Some(StorageFormat::U16Le));
        assert_eq!(StorageFormat::from_tag("u16be"), Some(StorageFormat::U16Be));
        assert_eq!(StorageFormat::from_tag("int8"), None);
    }

    #[test]
    fn test_serde_tags() {
        let json = serde_json::to_string(&StorageFormat::U16Be).unwrap();
        assert_eq!(json, "\"u16be\"");
        let parsed: StorageFormat = serde_json::from_str("\"u8\"").unwrap();
        assert_eq!(parsed, StorageFormat::U8);
        assert!(serde_json::from_str::<StorageFormat>("\"int16\"").is_err());
    }
}
