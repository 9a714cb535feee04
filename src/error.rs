//! Library-wide error and result types.

use std::io;

use thiserror::Error;

/// Result alias used throughout romkit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// A file simply being the wrong format is not an error: detectors return
/// `None` for that. `Error` covers I/O failures, structural corruption and
/// queries that cannot be answered.
#[derive(Debug, Error)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// A format version is present in the data but not supported.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),
    /// The source ended before all expected bytes could be read.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// A null-terminated string had no terminator before its region ended.
    #[error("unterminated string")]
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    /// A path lookup found no matching entry.
    #[error("no such file or directory")]
    NotFound,
    /// A directory operation was requested on a file entry.
    #[error("not a directory")]
    NotADirectory,
    /// A track was requested from an instance that failed validation.
    #[error("file is not a valid image of this format")]
    InvalidRom,
    /// The format does not provide the requested data.
    #[error("not supported by this format")]
    NotSupported,
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    /// Zstandard decompression failed.
    #[cfg(feature = "compression")]
    #[error("zstd decompression failed")]
    Zstd,
}

impl Error {
    /// Whether this error reports structurally corrupt data, as opposed to
    /// an I/O failure or an unanswerable query.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Error::Corrupt(_)
                | Error::InvalidRange
                | Error::UnterminatedName
                | Error::BadMagic
                | Error::UnsupportedVersion(_)
        )
    }
}
