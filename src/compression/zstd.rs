//! Zstandard decompression (requires the `compression` feature).
//!
//! Z3DS images store their payload as a seekable Zstandard stream: a run of
//! ordinary frames followed by a skippable seek-table frame. A plain
//! streaming decoder can therefore read the start of the payload without
//! the seek table, which is all [`decompress_prefix`] does.

#![cfg(feature = "compression")]

use std::io::Read;

use crate::{Error, Result};

/// Decompress at most `limit` bytes from the start of a Zstandard stream.
///
/// Stops early if the stream ends first. Returns [`Error::Zstd`] if the
/// decoder cannot be initialised or the data is not valid Zstandard.
pub fn decompress_prefix<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>> {
    let decoder = zstd::stream::read::Decoder::new(reader).map_err(|_| Error::Zstd)?;
    let mut out = Vec::with_capacity(limit);
    decoder
        .take(limit as u64)
        .read_to_end(&mut out)
        .map_err(|_| Error::Zstd)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_stops_at_limit() {
        let data = vec![0x5Au8; 4096];
        let packed = zstd::encode_all(&data[..], 3).unwrap();
        assert_eq!(decompress_prefix(&packed[..], 16).unwrap(), vec![0x5A; 16]);
        assert_eq!(decompress_prefix(&packed[..], 1 << 20).unwrap(), data);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(decompress_prefix(&b"not zstd"[..], 16), Err(Error::Zstd)));
    }
}
