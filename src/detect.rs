//! Format detection: probes, descriptors and the process-wide registry.
//!
//! A detector is a pure function over a [`DetectInfo`]. It runs its checks
//! cheapest first (header length, extension, magic, size consistency,
//! signature scheme, text sentinels) and returns at the first one that fails.
//!
//! [`identify`] runs every registered detector and keeps the best accept.
//! Higher [`Confidence`] wins; among equals the descriptor registered first
//! wins.

use std::fmt;

use crate::Result;
use crate::config::Config;
use crate::file::SharedFile;
use crate::formats::{gamecube, gba, wii_ticket, wii_tmd, wiiu_disc, z3ds};
use crate::rom::RomFormat;

/// Identifier of a supported format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatId {
    WiiTicket,
    WiiTmd,
    WiiUDisc,
    GameCubeDisc,
    GameBoyAdvance,
    Z3ds,
    /// Reserved for descriptors built outside this crate, e.g. in tests.
    Custom(u32),
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatId::WiiTicket => f.write_str("Wii ticket"),
            FormatId::WiiTmd => f.write_str("Wii TMD"),
            FormatId::WiiUDisc => f.write_str("Wii U disc"),
            FormatId::GameCubeDisc => f.write_str("GameCube/Wii disc"),
            FormatId::GameBoyAdvance => f.write_str("Game Boy Advance"),
            FormatId::Z3ds => f.write_str("Z3DS"),
            FormatId::Custom(n) => write!(f, "custom format {n}"),
        }
    }
}

/// Immutable input handed to every detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectInfo<'a> {
    /// Bytes read from the file, starting at [`addr`](Self::addr).
    pub header: &'a [u8],
    /// Absolute offset of `header`. Always 0 for the built-in detectors.
    pub addr: u64,
    /// File extension with its leading dot, if the file has one.
    pub ext: Option<&'a str>,
    /// Total size of the file.
    pub file_size: u64,
}

impl<'a> DetectInfo<'a> {
    pub fn new(header: &'a [u8], ext: Option<&'a str>, file_size: u64) -> Self {
        Self {
            header,
            addr: 0,
            ext,
            file_size,
        }
    }

    /// Whether the probe carries at least `len` bytes read from offset 0.
    pub fn has_header(&self, len: usize) -> bool {
        self.addr == 0 && self.header.len() >= len
    }

    /// Case-insensitive match of the probe extension against `exts`.
    /// A probe without an extension matches nothing.
    pub fn ext_in(&self, exts: &[&str]) -> bool {
        self.ext
            .is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// How strongly a detector believes in its accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    /// The magic number matched; the extension was missing or not one of
    /// the descriptor's.
    Magic,
    /// The magic number matched and so did the extension.
    ExtensionAndMagic,
}

/// A second magic number the detector could not see from the probe.
///
/// The parser instance reads `expected.len()` bytes at `offset` and treats
/// a mismatch (or a failed read) as a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub offset: u64,
    pub expected: &'static [u8],
}

/// A detector's accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub format: FormatId,
    pub confidence: Confidence,
    /// `Some` when the accept is provisional.
    pub confirm: Option<Confirmation>,
}

impl Detection {
    pub fn new(format: FormatId, confidence: Confidence) -> Self {
        Self {
            format,
            confidence,
            confirm: None,
        }
    }

    /// Accept with [`Confidence::ExtensionAndMagic`] when `exact_ext` holds,
    /// otherwise with [`Confidence::Magic`].
    pub fn ranked(format: FormatId, exact_ext: bool) -> Self {
        let confidence = if exact_ext {
            Confidence::ExtensionAndMagic
        } else {
            Confidence::Magic
        };
        Self::new(format, confidence)
    }

    /// Mark the accept as provisional.
    pub fn needs_confirmation(mut self, offset: u64, expected: &'static [u8]) -> Self {
        self.confirm = Some(Confirmation { offset, expected });
        self
    }

    pub fn is_provisional(&self) -> bool {
        self.confirm.is_some()
    }
}

/// Detector function signature.
pub type DetectFn = fn(&DetectInfo<'_>) -> Option<Detection>;

/// Builds a format's parser state once the header has been accepted.
///
/// Receives the shared file, the header bytes the detector saw and the
/// active configuration. Any error leaves the instance invalid.
pub type OpenFn = fn(&SharedFile, &[u8], &Config) -> Result<Box<dyn RomFormat>>;

/// Static description of one supported format.
pub struct FormatDescriptor {
    pub id: FormatId,
    pub name: &'static str,
    /// Accepted extensions; the first is canonical.
    pub extensions: &'static [&'static str],
    pub mime_types: &'static [&'static str],
    /// Bytes the detector needs from offset 0.
    pub header_size: usize,
    pub detect: DetectFn,
    pub open: OpenFn,
}

impl FormatDescriptor {
    /// Case-insensitive extension match.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Every built-in format, in registration order.
pub static REGISTRY: &[&FormatDescriptor] = &[
    &gamecube::DESCRIPTOR,
    &wiiu_disc::DESCRIPTOR,
    &gba::DESCRIPTOR,
    &wii_ticket::DESCRIPTOR,
    &wii_tmd::DESCRIPTOR,
    &z3ds::DESCRIPTOR,
];

/// Look up a built-in descriptor.
pub fn descriptor(id: FormatId) -> Option<&'static FormatDescriptor> {
    REGISTRY.iter().copied().find(|d| d.id == id)
}

/// Identify `probe` against the built-in registry.
pub fn identify(probe: &DetectInfo<'_>) -> Option<(&'static FormatDescriptor, Detection)> {
    identify_in(REGISTRY, probe)
}

/// Identify `probe` against an arbitrary registry.
pub fn identify_in(
    registry: &[&'static FormatDescriptor],
    probe: &DetectInfo<'_>,
) -> Option<(&'static FormatDescriptor, Detection)> {
    let mut best: Option<(&'static FormatDescriptor, Detection)> = None;
    for &desc in registry {
        let Some(hit) = (desc.detect)(probe) else {
            continue;
        };
        if best.is_none_or(|(_, b)| hit.confidence > b.confidence) {
            best = Some((desc, hit));
        }
    }
    best
}

/// Every accept for `probe`, best first. Equal confidences keep
/// registration order.
pub fn candidates_in(
    registry: &[&'static FormatDescriptor],
    probe: &DetectInfo<'_>,
) -> Vec<(&'static FormatDescriptor, Detection)> {
    let mut hits: Vec<_> = registry
        .iter()
        .filter_map(|&desc| (desc.detect)(probe).map(|hit| (desc, hit)))
        .collect();
    hits.sort_by(|a, b| b.1.confidence.cmp(&a.1.confidence));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn no_open(_: &SharedFile, _: &[u8], _: &Config) -> Result<Box<dyn RomFormat>> {
        Err(Error::NotSupported)
    }

    fn detect_abcd(info: &DetectInfo<'_>) -> Option<Detection> {
        (info.has_header(4) && &info.header[..4] == b"ABCD")
            .then(|| Detection::ranked(FormatId::Custom(1), info.ext_in(&[".one"])))
    }

    fn detect_abcd_too(info: &DetectInfo<'_>) -> Option<Detection> {
        (info.has_header(4) && &info.header[..4] == b"ABCD")
            .then(|| Detection::ranked(FormatId::Custom(2), info.ext_in(&[".two"])))
    }

    static FIRST: FormatDescriptor = FormatDescriptor {
        id: FormatId::Custom(1),
        name: "first",
        extensions: &[".one"],
        mime_types: &[],
        header_size: 4,
        detect: detect_abcd,
        open: no_open,
    };

    static SECOND: FormatDescriptor = FormatDescriptor {
        id: FormatId::Custom(2),
        name: "second",
        extensions: &[".two"],
        mime_types: &[],
        header_size: 4,
        detect: detect_abcd_too,
        open: no_open,
    };

    #[test]
    fn ties_go_to_registration_order() {
        let probe = DetectInfo::new(b"ABCD", None, 4);
        let (desc, _) = identify_in(&[&FIRST, &SECOND], &probe).unwrap();
        assert_eq!(desc.id, FormatId::Custom(1));
        let (desc, _) = identify_in(&[&SECOND, &FIRST], &probe).unwrap();
        assert_eq!(desc.id, FormatId::Custom(2));
    }

    #[test]
    fn exact_extension_outranks_magic_only() {
        let probe = DetectInfo::new(b"ABCD", Some(".TWO"), 4);
        let (desc, hit) = identify_in(&[&FIRST, &SECOND], &probe).unwrap();
        assert_eq!(desc.id, FormatId::Custom(2));
        assert_eq!(hit.confidence, Confidence::ExtensionAndMagic);

        let all = candidates_in(&[&FIRST, &SECOND], &probe);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0.id, FormatId::Custom(2));
    }

    #[test]
    fn nothing_accepts_foreign_bytes() {
        let probe = DetectInfo::new(b"WXYZ", Some(".one"), 4);
        assert!(identify_in(&[&FIRST, &SECOND], &probe).is_none());
    }

    #[test]
    fn registry_ids_are_unique() {
        for (i, a) in REGISTRY.iter().enumerate() {
            for b in &REGISTRY[i + 1..] {
                assert_ne!(a.id, b.id);
            }
            assert!(descriptor(a.id).is_some());
            assert!(a.extensions.iter().all(|e| e.starts_with('.')));
        }
    }
}
