//! Decompression helpers (requires the `compression` feature).
//!
//! The core detectors and parsers never decompress anything. Formats that
//! wrap a compressed payload use these helpers only for optional extras,
//! such as peeking at the payload's own magic number. Enable the feature
//! to get them:
//!
//! ```toml
//! [dependencies]
//! romkit = { version = "0.1", features = ["compression"] }
//! ```
//!
//! | Module | Algorithm | Used by |
//! |--------|-----------|---------|
//! | [`zstd`] | Zstandard | [`crate::formats::z3ds`] payload peek |

#[cfg(feature = "compression")]
pub mod zstd;
