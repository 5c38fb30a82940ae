//! Raw ↔ physical conversion.
//!
//! A cell is an unsigned integer in the image; its physical value is
//! `raw * scale + bias`. Encoding inverts the affine transform and truncates
//! toward zero. Results that do not fit the storage width are reported as
//! [`CodecError::EncodeRange`] rather than wrapped.

use crate::enums::StorageFormat;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

/// Quotients closer than this to an integer are taken as that integer before
/// truncation (`4.2 / 0.04` is `104.99999999999999` in binary floating point).
const SNAP_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("raw value {raw} does not fit {format} (0..={max})")]
    EncodeRange {
        raw: f64,
        format: StorageFormat,
        max: u32,
    },
}

// ─── Decoding ───────────────────────────────────────────────────────────────

/// Interpret the first `format.width()` bytes of `bytes` as an unsigned integer.
pub fn decode_raw(bytes: &[u8], format: StorageFormat) -> u32 {
    debug_assert!(
        bytes.len() >= format.width(),
        "decode_raw: need {} bytes, got {}",
        format.width(),
        bytes.len()
    );
    match format {
        StorageFormat::U8 => bytes[0] as u32,
        StorageFormat::U16Le => LittleEndian::read_u16(bytes) as u32,
        StorageFormat::U16Be => BigEndian::read_u16(bytes) as u32,
    }
}

/// Apply the affine transform to a raw integer.
pub fn raw_to_physical(raw: u32, scale: f64, bias: f64) -> f64 {
    raw as f64 * scale + bias
}

/// Decode one cell to its physical value.
pub fn decode(bytes: &[u8], format: StorageFormat, scale: f64, bias: f64) -> f64 {
    raw_to_physical(decode_raw(bytes, format), scale, bias)
}

// ─── Encoding ───────────────────────────────────────────────────────────────

/// Truncate a raw quotient toward zero and check it against the format's range.
pub fn quantize(quotient: f64, format: StorageFormat) -> Result<u32, CodecError> {
    let max = format.max_raw();
    let out_of_range = CodecError::EncodeRange {
        raw: quotient,
        format,
        max,
    };
    if !quotient.is_finite() {
        return Err(out_of_range);
    }
    let nearest = quotient.round();
    let truncated = if (quotient - nearest).abs() < SNAP_TOLERANCE {
        nearest
    } else {
        quotient.trunc()
    };
    if truncated < 0.0 || truncated > max as f64 {
        return Err(out_of_range);
    }
    Ok(truncated as u32)
}

/// Inverse affine transform: the raw integer that stores `physical`.
pub fn physical_to_raw(
    physical: f64,
    format: StorageFormat,
    scale: f64,
    bias: f64,
) -> Result<u32, CodecError> {
    quantize((physical - bias) / scale, format)
}

/// Serialize a raw integer in the format's width and byte order.
///
/// `raw` must already be within `format.max_raw()`.
pub fn encode_raw(raw: u32, format: StorageFormat) -> Vec<u8> {
    debug_assert!(raw <= format.max_raw(), "encode_raw: {raw} exceeds {format}");
    let mut buf = vec![0u8; format.width()];
    match format {
        StorageFormat::U8 => buf[0] = raw as u8,
        StorageFormat::U16Le => LittleEndian::write_u16(&mut buf, raw as u16),
        StorageFormat::U16Be => BigEndian::write_u16(&mut buf, raw as u16),
    }
    buf
}

/// Encode a physical value into the bytes that store it.
pub fn encode(
    physical: f64,
    format: StorageFormat,
    scale: f64,
    bias: f64,
) -> Result<Vec<u8>, CodecError> {
    let raw = physical_to_raw(physical, format, scale, bias)?;
    Ok(encode_raw(raw, format))
}
