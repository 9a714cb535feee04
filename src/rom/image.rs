//! Image tracks and the decoder collaborator.
//!
//! Formats extract raw pixel data plus its declared geometry and pixel
//! format. Turning that into something displayable is the job of an
//! [`ImageDecoder`] supplied by the embedding application.

use std::any::Any;
use std::sync::Arc;

use crate::Result;

/// Kinds of embedded image a format may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    InternalIcon,
    InternalBanner,
    InternalMedia,
    InternalImage,
}

impl ImageType {
    pub const COUNT: usize = 4;

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// On-disk pixel encodings handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// GameCube RGB5A3 in 4x4 tiles, big-endian.
    Rgb5A3Tiled,
}

/// Undecoded image data extracted from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Opaque decoded image produced by an [`ImageDecoder`].
pub type ImageHandle = Arc<dyn Any + Send + Sync>;

/// Converts [`RawImage`]s into application images.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, raw: RawImage) -> Result<ImageHandle>;
}

/// Decoder that returns the [`RawImage`] itself, undecoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawImageDecoder;

impl ImageDecoder for RawImageDecoder {
    fn decode(&self, raw: RawImage) -> Result<ImageHandle> {
        Ok(Arc::new(raw))
    }
}
