//! Record layout and offset bitmap
//!
//! The metadata header carries a hex-encoded bitmap describing where each
//! field of the nominal fixed-width record starts. Readers only need the
//! field count, which is recovered by counting separator bits.
//!
//! ## Bitmap Format
//! ```text
//! offsets = [0, 4, 5]   record_size = 13
//!
//!  field 0   sep  f1  sep  field 2 (8 bytes)   pad
//! ┌────────┬────┬────┬────┬──────────────────┬──────┐
//! │ 1 1 1 1│ 0  │ 1  │ 0  │ 1 1 1 1 1 1 1 1  │ 0 0 0│
//! └────────┴────┴────┴────┴──────────────────┴──────┘
//!  bit length = record_size + fields - 1, rounded up to a whole byte
//! ```
//!
//! Every field is at least one byte wide, so the last meaningful bit is
//! always `1` and trimming trailing zeros removes exactly the padding.

use crate::error::{Result, TabulaError};

use super::Schema;

/// Bit sequence, most significant bit first when packed into bytes
pub type OffsetBitmap = Vec<bool>;

/// Nominal fixed-width layout of a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Byte offset of each field within the nominal record
    pub offsets: Vec<usize>,
    /// Total nominal record size in bytes
    pub record_size: usize,
}

impl Layout {
    pub fn compute(schema: &Schema) -> Self {
        let mut offsets = Vec::with_capacity(schema.len());
        let mut offset = 0;
        for field in schema.fields() {
            offsets.push(offset);
            offset += field.nominal_size();
        }
        Self {
            offsets,
            record_size: offset,
        }
    }

    /// Encode this layout as an offset bitmap
    pub fn bitmap(&self) -> OffsetBitmap {
        encode_offset_bitmap(&self.offsets, self.record_size)
    }
}

/// Encode field boundaries as a bitmap with one inserted `0` per boundary
/// after the first, padded with zeros to a whole byte.
pub fn encode_offset_bitmap(offsets: &[usize], record_size: usize) -> OffsetBitmap {
    if offsets.is_empty() {
        return Vec::new();
    }

    let actual_bits = record_size + offsets.len() - 1;
    let padded_bits = actual_bits.div_ceil(8) * 8;

    let mut bits = vec![true; padded_bits];
    for (i, offset) in offsets.iter().enumerate().skip(1) {
        bits[offset + i - 1] = false;
    }
    for bit in bits.iter_mut().skip(actual_bits) {
        *bit = false;
    }
    bits
}

/// Drop trailing `0` bits (the byte padding)
pub fn trim_trailing_zeros(bits: &[bool]) -> &[bool] {
    let end = bits.iter().rposition(|&b| b).map_or(0, |i| i + 1);
    &bits[..end]
}

/// Recover the number of fields described by a bitmap
pub fn decode_field_count(bits: &[bool]) -> usize {
    let trimmed = trim_trailing_zeros(bits);
    trimmed.iter().filter(|&&b| !b).count() + 1
}

/// Recover the nominal field offsets described by a bitmap
pub fn decode_offsets(bits: &[bool]) -> Vec<usize> {
    let trimmed = trim_trailing_zeros(bits);
    let mut offsets = vec![0];
    for (i, &bit) in trimmed.iter().enumerate() {
        if !bit {
            // Each earlier separator shifted later positions by one
            offsets.push(i + 1 - offsets.len());
        }
    }
    offsets
}

/// Pack bits MSB-first and render two uppercase hex digits per byte
pub fn bitmap_to_hex(bits: &[bool]) -> String {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    to_hex(&bytes)
}

/// Inverse of [`bitmap_to_hex`]
pub fn bitmap_from_hex(text: &str) -> Result<OffsetBitmap> {
    let bytes = from_hex(text.trim())
        .ok_or_else(|| TabulaError::MetadataCorrupt(format!("invalid offset bitmap '{}'", text.trim())))?;

    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            bits.push(byte & (1 << shift) != 0);
        }
    }
    Ok(bits)
}

/// Uppercase hex, two digits per byte
pub fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.push_str(&format!("{:02X}", byte));
    }
    hex
}

/// Parse hex digits of either case; `None` on odd length or a non-hex digit
pub fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
