//! Low-level byte primitives shared by all parsers.
//!
//! Headers are read into memory once, so these helpers decode fixed-offset
//! fields from byte slices instead of pulling from a stream. Every function
//! bounds-checks and returns [`Error::InvalidRange`] rather than panicking:
//! a field past the end of bytes already in memory is corrupt data, not a
//! short read.

use crate::{Error, Result};

/// Borrow exactly `N` bytes starting at `offset`.
#[inline]
pub(crate) fn bytesa<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    buf.get(offset..offset.checked_add(N).ok_or(Error::InvalidRange)?)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidRange)
}

/// Read one byte.
#[inline]
pub(crate) fn u8_at(buf: &[u8], offset: usize) -> Result<u8> {
    buf.get(offset).copied().ok_or(Error::InvalidRange)
}

/// Read a little-endian `u16`.
#[inline]
pub(crate) fn le_u16(buf: &[u8], offset: usize) -> Result<u16> {
    bytesa(buf, offset).map(u16::from_le_bytes)
}

/// Read a little-endian `u32`.
#[inline]
pub(crate) fn le_u32(buf: &[u8], offset: usize) -> Result<u32> {
    bytesa(buf, offset).map(u32::from_le_bytes)
}

/// Read a little-endian `u64`.
#[inline]
pub(crate) fn le_u64(buf: &[u8], offset: usize) -> Result<u64> {
    bytesa(buf, offset).map(u64::from_le_bytes)
}

/// Read a big-endian `u16`.
#[inline]
pub(crate) fn be_u16(buf: &[u8], offset: usize) -> Result<u16> {
    bytesa(buf, offset).map(u16::from_be_bytes)
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32(buf: &[u8], offset: usize) -> Result<u32> {
    bytesa(buf, offset).map(u32::from_be_bytes)
}

/// Read a big-endian `u64`.
#[inline]
pub(crate) fn be_u64(buf: &[u8], offset: usize) -> Result<u64> {
    bytesa(buf, offset).map(u64::from_be_bytes)
}

/// Check that `buf` holds `expected` at `offset`.
#[inline]
pub(crate) fn has_magic(buf: &[u8], offset: usize, expected: &[u8]) -> bool {
    buf.get(offset..offset + expected.len()) == Some(expected)
}

/// Decode a fixed-size text field, stopping at the first NUL.
///
/// Console headers store names in Latin-1 or cp1252; bytes that are not
/// valid UTF-8 are mapped one-to-one onto their Latin-1 code points.
pub(crate) fn fixed_string(field: &[u8]) -> String {
    let end = memchr::memchr(0, field).unwrap_or(field.len());
    decode_text(&field[..end])
}

/// Decode raw name bytes as UTF-8, falling back to Latin-1.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_endians() {
        let buf = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
        assert_eq!(be_u32(&buf, 0).unwrap(), 0x1234_5678);
        assert_eq!(le_u32(&buf, 0).unwrap(), 0x7856_3412);
        assert_eq!(be_u16(&buf, 6).unwrap(), 0xDEF0);
        assert_eq!(be_u64(&buf, 0).unwrap(), 0x1234_5678_9ABC_DEF0);
        assert!(matches!(be_u32(&buf, 6), Err(Error::InvalidRange)));
        assert!(u8_at(&buf, 8).unwrap_err().is_corrupt());
    }

    #[test]
    fn fixed_string_stops_at_nul_and_falls_back_to_latin1() {
        assert_eq!(fixed_string(b"ZELDA\0\0\0"), "ZELDA");
        assert_eq!(fixed_string(&[b'P', 0xE9, b'e']), "P\u{e9}e");
    }
}
