//! Detection and field helpers shared by signed title blobs (tickets and
//! TMDs).
//!
//! Both start with a big-endian signature type and an RSA-2048 signature,
//! followed by a 0x40-byte issuer string such as `Root-CA00000001-XS00000003`.
//! They differ in where the format version and title ID live and in which
//! file sizes each version implies, so each format describes itself with a
//! [`SignedBlob`] and shares [`SignedBlob::detect`].

use tracing::trace;

use crate::detect::{Confidence, DetectInfo, Detection, FormatId};
use crate::utils::{be_u32, be_u64, bytesa, fixed_string, has_magic, u8_at};
use crate::Result;

pub(crate) const SIGTYPE_RSA2048_SHA1: u32 = 0x0001_0001;
pub(crate) const SIGTYPE_RSA2048_SHA256: u32 = 0x0001_0004;
pub(crate) const SIGTYPE_FLAG_DISC: u32 = 0x0002_0000;

pub(crate) const ISSUER_OFFSET: usize = 0x140;
pub(crate) const ISSUER_LEN: usize = 0x40;

/// A historical file that is smaller than its version implies.
pub(crate) struct SizeException {
    pub version: u8,
    pub title_id: u64,
    pub file_size: u64,
}

pub(crate) struct SignedBlob {
    pub format: FormatId,
    pub extensions: &'static [&'static str],
    /// Bytes the detector reads.
    pub header_size: usize,
    pub version_offset: usize,
    pub title_id_offset: usize,
    /// Minimum file size, indexed by format version. Versions past the end
    /// are unknown and rejected.
    pub min_sizes: &'static [u64],
    pub exceptions: &'static [SizeException],
}

/// Cascade step that turned a blob down, in the order the steps run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    ShortHeader,
    Extension,
    UnknownVersion,
    FileSize,
    SignatureType,
    SignatureVersion,
    Issuer,
}

impl SignedBlob {
    pub fn detect(&self, info: &DetectInfo<'_>) -> Option<Detection> {
        match self.check(info) {
            Ok(()) => Some(Detection::new(self.format, Confidence::ExtensionAndMagic)),
            Err(step) => {
                trace!(format = %self.format, ?step, file_size = info.file_size, "signed blob rejected");
                None
            }
        }
    }

    /// Run the cascade cheapest check first: size, then signature scheme,
    /// then issuer.
    pub(crate) fn check(&self, info: &DetectInfo<'_>) -> std::result::Result<(), Rejection> {
        if !info.has_header(self.header_size) {
            return Err(Rejection::ShortHeader);
        }
        // The signed-blob layout has no magic of its own, so the
        // extension is mandatory.
        if !info.ext_in(self.extensions) {
            return Err(Rejection::Extension);
        }
        let h = info.header;

        let version = u8_at(h, self.version_offset).map_err(|_| Rejection::ShortHeader)?;
        let &min_size = self
            .min_sizes
            .get(usize::from(version))
            .ok_or(Rejection::UnknownVersion)?;
        if info.file_size < min_size && !self.is_excepted(version, h, info.file_size) {
            return Err(Rejection::FileSize);
        }

        let needs_v1 = match be_u32(h, 0).map_err(|_| Rejection::ShortHeader)? {
            SIGTYPE_RSA2048_SHA1 => false,
            t if t & !SIGTYPE_FLAG_DISC == SIGTYPE_RSA2048_SHA256 => true,
            _ => return Err(Rejection::SignatureType),
        };
        if needs_v1 && version < 1 {
            return Err(Rejection::SignatureVersion);
        }

        if !has_magic(h, ISSUER_OFFSET, b"Root-") {
            return Err(Rejection::Issuer);
        }
        Ok(())
    }

    fn is_excepted(&self, version: u8, header: &[u8], file_size: u64) -> bool {
        let Ok(title_id) = be_u64(header, self.title_id_offset) else {
            return false;
        };
        self.exceptions
            .iter()
            .any(|e| e.version == version && e.title_id == title_id && e.file_size == file_size)
    }
}

/// Issuer string with trailing NULs removed.
pub(crate) fn issuer(header: &[u8]) -> Result<String> {
    bytesa::<ISSUER_LEN>(header, ISSUER_OFFSET).map(|field| fixed_string(&field))
}

/// Parse `Root-CAxxxxxxxx-XSxxxxxxxx` into its CA and XS numbers.
pub(crate) fn parse_issuer(issuer: &str) -> Option<(u32, u32)> {
    let rest = issuer.strip_prefix("Root-CA")?;
    let (ca, xs) = rest.split_once("-XS")?;
    if ca.len() != 8 || xs.len() != 8 {
        return None;
    }
    Some((
        u32::from_str_radix(ca, 16).ok()?,
        u32::from_str_radix(xs, 16).ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOB: SignedBlob = SignedBlob {
        format: FormatId::WiiTicket,
        extensions: &[".tik"],
        header_size: 0x2A4,
        version_offset: 0x1BC,
        title_id_offset: 0x1DC,
        min_sizes: &[0x2A4, 0x2A4 + 0x60],
        exceptions: &[],
    };

    fn blob(sig_type: u32, version: u8) -> Vec<u8> {
        let mut h = vec![0u8; 0x2A4];
        h[..4].copy_from_slice(&sig_type.to_be_bytes());
        h[ISSUER_OFFSET..ISSUER_OFFSET + 5].copy_from_slice(b"Root-");
        h[0x1BC] = version;
        h
    }

    #[test]
    fn size_is_checked_before_the_signature_scheme() {
        let h = blob(0xDEAD_BEEF, 0);
        assert_eq!(BLOB.check(&DetectInfo::new(&h, Some(".tik"), 0x10)), Err(Rejection::FileSize));
        assert_eq!(BLOB.check(&DetectInfo::new(&h, Some(".tik"), 0x2A4)), Err(Rejection::SignatureType));

        let h = blob(SIGTYPE_RSA2048_SHA256, 0);
        assert_eq!(BLOB.check(&DetectInfo::new(&h, Some(".tik"), 0x10)), Err(Rejection::FileSize));
        assert_eq!(BLOB.check(&DetectInfo::new(&h, Some(".tik"), 0x2A4)), Err(Rejection::SignatureVersion));
    }

    #[test]
    fn cascade_steps() {
        let mut h = blob(SIGTYPE_RSA2048_SHA1, 0);
        assert_eq!(BLOB.check(&DetectInfo::new(&h[..0x100], Some(".tik"), 0x2A4)), Err(Rejection::ShortHeader));
        assert_eq!(BLOB.check(&DetectInfo::new(&h, None, 0x2A4)), Err(Rejection::Extension));
        assert_eq!(BLOB.check(&DetectInfo::new(&h, Some(".tik"), 0x2A4)), Ok(()));
        h[ISSUER_OFFSET] = b'X';
        assert_eq!(BLOB.check(&DetectInfo::new(&h, Some(".tik"), 0x2A4)), Err(Rejection::Issuer));
        h[0x1BC] = 2;
        assert_eq!(BLOB.check(&DetectInfo::new(&h, Some(".tik"), 0x10000)), Err(Rejection::UnknownVersion));
    }

    #[test]
    fn issuer_parts() {
        assert_eq!(parse_issuer("Root-CA00000001-XS00000003"), Some((1, 3)));
        assert_eq!(parse_issuer("Root-CA00000111-XS00000114"), Some((0x111, 0x114)));
        assert_eq!(parse_issuer("Root-CA00000001-CP00000004"), None);
        assert_eq!(parse_issuer("Root-CA00000001-XS00000003x"), None);
    }
}
