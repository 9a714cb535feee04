//! Parser instances: validity, lazily loaded tracks and the factory.
//!
//! ## Lifecycle
//! ```text
//! Unchecked --read header--> Valid | Invalid
//!
//! Valid:  fields    Unloaded --> Loaded | LoadFailed
//!         metadata  Unloaded --> Loaded | LoadFailed
//!         image[T]  Unloaded --> Loaded | LoadFailed   (one per ImageType)
//! ```
//!
//! Validity is decided once in [`RomData::open`] and never re-evaluated.
//! An invalid instance releases its [`SharedFile`] immediately.
//!
//! Each track is a [`OnceCell`] holding the load result. The first caller
//! runs the load; concurrent callers block on the cell and then see the
//! same result. Failures are cached too, so a broken track is not retried
//! on every access. Build a new instance to retry.

mod fields;
mod image;

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::detect::{self, DetectInfo, Detection, FormatDescriptor, FormatId};
use crate::file::SharedFile;
use crate::{Error, Result};

pub use fields::{Base, Field, FieldValue, Property, RomFields, RomMetaData};
pub use image::{ImageDecoder, ImageHandle, ImageType, PixelFormat, RawImage, RawImageDecoder};

/// Result of a track access. Both sides borrow from the instance cache.
pub type Track<'a, T> = std::result::Result<&'a T, &'a Error>;

/// Per-format behaviour behind a [`RomData`].
///
/// Implementations are built by a descriptor's `open` function after the
/// header has been accepted, and only ever see a valid file.
pub trait RomFormat: Send + Sync + 'static {
    /// Name of the system the file targets.
    fn system_name(&self) -> &'static str;

    fn load_fields(&self, file: &SharedFile) -> Result<RomFields>;

    fn load_metadata(&self, file: &SharedFile) -> Result<RomMetaData>;

    /// Image types [`load_image`](Self::load_image) can produce.
    fn supported_images(&self) -> &'static [ImageType] {
        &[]
    }

    fn load_image(&self, _file: &SharedFile, _kind: ImageType) -> Result<RawImage> {
        Err(Error::NotSupported)
    }

    /// Access to the concrete type, for format-specific sub-structures.
    fn as_any(&self) -> &dyn Any;
}

/// Tri-state validity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Unchecked,
    Valid,
    Invalid,
}

/// One file bound to one format.
pub struct RomData {
    file: Option<SharedFile>,
    validity: Validity,
    format_id: Option<FormatId>,
    detection: Option<Detection>,
    format: Option<Box<dyn RomFormat>>,
    images_enabled: bool,
    decoder: Arc<dyn ImageDecoder>,
    fields: OnceCell<Result<RomFields>>,
    metadata: OnceCell<Result<RomMetaData>>,
    images: [OnceCell<Result<ImageHandle>>; ImageType::COUNT],
}

impl RomData {
    fn unchecked(file: SharedFile, format_id: Option<FormatId>, config: &Config) -> Self {
        Self {
            file: Some(file),
            validity: Validity::Unchecked,
            format_id,
            detection: None,
            format: None,
            images_enabled: config.images.enabled,
            decoder: Arc::new(RawImageDecoder),
            fields: OnceCell::new(),
            metadata: OnceCell::new(),
            images: Default::default(),
        }
    }

    /// Bind `file` to the format described by `desc`.
    ///
    /// Reads exactly `desc.header_size` bytes, runs the detector, performs
    /// any confirmation read it asks for and lets the format check its own
    /// header invariants. The returned instance is either valid or
    /// permanently invalid.
    pub fn open(file: SharedFile, desc: &'static FormatDescriptor, config: &Config) -> Self {
        let mut rom = Self::unchecked(file.clone(), Some(desc.id), config);
        match Self::check(&file, desc, config) {
            Ok((detection, format)) => {
                debug!(format = %desc.id, "header accepted");
                rom.validity = Validity::Valid;
                rom.detection = Some(detection);
                rom.format = Some(format);
            }
            Err(reason) => {
                debug!(format = %desc.id, %reason, "header rejected");
                rom.invalidate();
            }
        }
        rom
    }

    fn check(
        file: &SharedFile,
        desc: &'static FormatDescriptor,
        config: &Config,
    ) -> Result<(Detection, Box<dyn RomFormat>)> {
        let mut header = vec![0u8; desc.header_size];
        file.read_exact_at(0, &mut header)?;

        let info = DetectInfo::new(&header, file.extension(), file.size());
        let detection = (desc.detect)(&info).ok_or(Error::BadMagic)?;

        if let Some(confirm) = detection.confirm {
            let mut got = vec![0u8; confirm.expected.len()];
            file.read_exact_at(confirm.offset, &mut got)?;
            if got != confirm.expected {
                trace!(offset = confirm.offset, "confirmation magic mismatch");
                return Err(Error::BadMagic);
            }
        }

        let format = (desc.open)(file, &header, config)?;
        Ok((detection, format))
    }

    /// Wrap an already-constructed format. The instance is valid.
    pub fn with_format(file: SharedFile, format: Box<dyn RomFormat>) -> Self {
        let mut rom = Self::unchecked(file, None, &Config::default());
        rom.validity = Validity::Valid;
        rom.format = Some(format);
        rom
    }

    /// Replace the image decoder. Must be called before any image is loaded
    /// to take effect for that image.
    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    fn invalidate(&mut self) {
        self.validity = Validity::Invalid;
        self.file = None;
        self.format = None;
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    /// Format the instance was opened as. `None` for [`with_format`]
    /// instances.
    ///
    /// [`with_format`]: Self::with_format
    pub fn format_id(&self) -> Option<FormatId> {
        self.format_id
    }

    /// The detector's accept, for instances built by [`open`](Self::open).
    pub fn detection(&self) -> Option<&Detection> {
        self.detection.as_ref()
    }

    /// The shared file, or `None` once the instance is invalid.
    pub fn file(&self) -> Option<&SharedFile> {
        self.file.as_ref()
    }

    pub fn system_name(&self) -> Option<&'static str> {
        self.format.as_ref().map(|f| f.system_name())
    }

    /// Downcast the format implementation.
    pub fn format_as<T: RomFormat>(&self) -> Option<&T> {
        self.format.as_ref()?.as_any().downcast_ref::<T>()
    }

    fn loaded<'a, T>(
        &'a self,
        cell: &'a OnceCell<Result<T>>,
        what: &str,
        load: impl FnOnce(&dyn RomFormat, &SharedFile) -> Result<T>,
    ) -> Track<'a, T> {
        cell.get_or_init(|| {
            let (Some(format), Some(file)) = (self.format.as_deref(), self.file.as_ref()) else {
                return Err(Error::InvalidRom);
            };
            let result = load(format, file);
            match &result {
                Ok(_) => debug!(track = what, "track loaded"),
                Err(e) => warn!(track = what, error = %e, "track failed to load"),
            }
            result
        })
        .as_ref()
    }

    /// Display fields, loaded on first call.
    pub fn fields(&self) -> Track<'_, RomFields> {
        self.loaded(&self.fields, "fields", |f, file| f.load_fields(file))
    }

    /// Standardized metadata, loaded on first call.
    pub fn metadata(&self) -> Track<'_, RomMetaData> {
        self.loaded(&self.metadata, "metadata", |f, file| f.load_metadata(file))
    }

    /// Image types this instance can produce.
    pub fn supported_images(&self) -> &'static [ImageType] {
        match &self.format {
            Some(f) if self.images_enabled => f.supported_images(),
            _ => &[],
        }
    }

    /// Decoded image of `kind`, loaded on first call.
    pub fn image(&self, kind: ImageType) -> Track<'_, ImageHandle> {
        let enabled = self.images_enabled;
        self.loaded(&self.images[kind.index()], "image", |f, file| {
            if !enabled || !f.supported_images().contains(&kind) {
                return Err(Error::NotSupported);
            }
            self.decoder.decode(f.load_image(file, kind)?)
        })
    }
}

impl std::fmt::Debug for RomData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RomData")
            .field("file", &self.file)
            .field("validity", &self.validity)
            .field("format_id", &self.format_id)
            .finish_non_exhaustive()
    }
}

/// Opens files against a registry of formats.
#[derive(Clone)]
pub struct RomFactory {
    config: Config,
    registry: &'static [&'static FormatDescriptor],
    decoder: Arc<dyn ImageDecoder>,
}

impl Default for RomFactory {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl RomFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: detect::REGISTRY,
            decoder: Arc::new(RawImageDecoder),
        }
    }

    /// Use a different set of formats.
    pub fn with_registry(mut self, registry: &'static [&'static FormatDescriptor]) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn probe(&self, file: &SharedFile) -> Result<Vec<u8>> {
        let len = usize::try_from(file.size())
            .unwrap_or(usize::MAX)
            .min(self.config.detect.probe_size);
        let mut header = vec![0u8; len];
        file.read_exact_at(0, &mut header)?;
        Ok(header)
    }

    /// Best detector accept for `file`, without opening it.
    pub fn identify(&self, file: &SharedFile) -> Result<Option<(&'static FormatDescriptor, Detection)>> {
        let header = self.probe(file)?;
        let info = DetectInfo::new(&header, file.extension(), file.size());
        Ok(detect::identify_in(self.registry, &info))
    }

    /// Open `file` as the best matching format.
    ///
    /// Candidates are tried best first; a provisional accept whose
    /// confirmation fails falls through to the next candidate. `Ok(None)`
    /// means no format applies. Only a failure to read the probe is an
    /// error.
    pub fn open(&self, file: SharedFile) -> Result<Option<RomData>> {
        let header = self.probe(&file)?;
        let info = DetectInfo::new(&header, file.extension(), file.size());
        for (desc, _) in detect::candidates_in(self.registry, &info) {
            let rom = RomData::open(file.clone(), desc, &self.config).with_decoder(self.decoder.clone());
            if rom.is_valid() {
                return Ok(Some(rom));
            }
        }
        debug!(filename = file.filename(), "no format accepted the file");
        Ok(None)
    }

    /// Open a file from disk.
    pub fn open_path(&self, path: impl AsRef<Path>) -> Result<Option<RomData>> {
        self.open(SharedFile::open(path)?)
    }
}
