//! Checksum and hash helpers used by detectors and validity checks.
//!
//! Callers hand over a byte range and an [`Algorithm`] tag and compare the
//! resulting [`Digest`] against the value embedded in the file.

use sha2::{Digest as _, Sha256};

/// Supported algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Game Boy Advance header checksum: the negated byte sum of the range,
    /// minus 0x19. Computed over header bytes `0xA0..=0xBC`.
    GbaHeader,
    /// SHA-256.
    Sha256,
}

/// Fixed-width result of a checksum computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Digest {
    U8(u8),
    Sha256([u8; 32]),
}

impl Digest {
    /// Digest bytes in the order they are stored on disk.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Digest::U8(b) => std::slice::from_ref(b),
            Digest::Sha256(h) => h,
        }
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Digest::U8(b) => write!(f, "0x{b:02X}"),
            Digest::Sha256(h) => f.write_str(&hex::encode(h)),
        }
    }
}

/// Compute `algorithm` over `data`.
pub fn digest(algorithm: Algorithm, data: &[u8]) -> Digest {
    match algorithm {
        Algorithm::GbaHeader => {
            let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_sub(b));
            Digest::U8(sum.wrapping_sub(0x19))
        }
        Algorithm::Sha256 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(&Sha256::digest(data));
            Digest::Sha256(out)
        }
    }
}

/// Compare the digest of `data` with an embedded value.
pub fn verify(algorithm: Algorithm, data: &[u8], expected: &[u8]) -> bool {
    digest(algorithm, data).as_bytes() == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gba_complement_of_zeroes() {
        assert_eq!(digest(Algorithm::GbaHeader, &[0u8; 0x1D]), Digest::U8(0xE7));
        assert!(verify(Algorithm::GbaHeader, &[0u8; 0x1D], &[0xE7]));
    }

    #[test]
    fn sha256_known_vector() {
        let d = digest(Algorithm::Sha256, b"abc");
        assert_eq!(
            d.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(!verify(Algorithm::Sha256, b"abd", d.as_bytes()));
    }
}
