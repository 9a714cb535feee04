//! Z3DS: Zstandard-compressed Nintendo 3DS images (`.zcci`, `.zcxi`,
//! `.z3dsx`, `.zcia`).
//!
//! ## Header (0x20 bytes, little-endian)
//! ```text
//! [0x00] Magic "Z3DS"                                  (4 bytes)
//! [0x04] Underlying format magic, e.g. "NCSD"          (4 bytes)
//! [0x08] Version, always 1                             (u8)
//! [0x09] Reserved                                      (u8)
//! [0x0A] HeaderSize                                    (u16)
//! [0x0C] MetadataSize                                  (u32)
//! [0x10] CompressedSize                                (u64)
//! [0x18] UncompressedSize                              (u64)
//! ```
//!
//! ## Metadata (at 0x20, `MetadataSize` bytes)
//! ```text
//! [0x00] Metadata version, always 1                    (u8)
//! [0x01] Items:
//!        [0x00] Type (0 = end, 1 = binary)             (u8)
//!        [0x01] KeyLength                              (u8)
//!        [0x02] ValueLength                            (u16)
//!        [0x04] Key, then value
//! ```
//!
//! The compressed payload starts at `HeaderSize + MetadataSize`.

use std::any::Any;

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::config::Config;
use crate::detect::{DetectInfo, Detection, FormatDescriptor, FormatId};
use crate::file::SharedFile;
use crate::rom::{Property, RomFields, RomFormat, RomMetaData, Track};
use crate::utils::{bytesa, decode_text, fixed_string, has_magic, le_u16, le_u32, le_u64, u8_at};
use crate::{Error, Result};

pub const HEADER_SIZE: usize = 0x20;
const MAGIC: &[u8] = b"Z3DS";
const VERSION: u8 = 1;
const METADATA_VERSION: u8 = 1;
const ITEM_HEADER_SIZE: usize = 4;
const ITEM_END: u8 = 0;
const ITEM_BINARY: u8 = 1;

pub static DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::Z3ds,
    name: "Z3DS compressed Nintendo 3DS image",
    extensions: &[".zcci", ".zcxi", ".z3dsx", ".zcia"],
    mime_types: &["application/x-nintendo-3ds-z3ds"],
    header_size: HEADER_SIZE,
    detect,
    open,
};

pub fn detect(info: &DetectInfo<'_>) -> Option<Detection> {
    if !info.has_header(HEADER_SIZE) {
        return None;
    }
    let h = info.header;
    if !has_magic(h, 0, MAGIC) || h[0x08] != VERSION {
        return None;
    }
    let header_size = u64::from(le_u16(h, 0x0A).ok()?);
    let metadata_size = u64::from(le_u32(h, 0x0C).ok()?);
    if header_size + metadata_size >= info.file_size {
        trace!(header_size, metadata_size, "Z3DS payload starts past the end of the file");
        return None;
    }
    Some(Detection::ranked(FormatId::Z3ds, info.ext_in(DESCRIPTOR.extensions)))
}

fn open(_file: &SharedFile, header: &[u8], config: &Config) -> Result<Box<dyn RomFormat>> {
    let mut z3ds = Z3ds::parse(header)?;
    z3ds.max_metadata_size = config.limits.max_metadata_size;
    Ok(Box::new(z3ds))
}

/// One key/value item from the metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub key: String,
    pub value: Vec<u8>,
}

impl MetadataItem {
    /// Value as text when it is printable UTF-8, otherwise as hex.
    pub fn display_value(&self) -> String {
        let trimmed = self.value.strip_suffix(&[0]).unwrap_or(&self.value);
        match std::str::from_utf8(trimmed) {
            Ok(s) if !s.chars().any(char::is_control) => s.to_owned(),
            _ => hex::encode_upper(&self.value),
        }
    }
}

/// Decoded Z3DS header.
#[derive(Debug)]
pub struct Z3ds {
    pub underlying_magic: [u8; 4],
    pub header_size: u16,
    pub metadata_size: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    max_metadata_size: u32,
    metadata: OnceCell<Result<Vec<MetadataItem>>>,
}

impl Z3ds {
    pub fn parse(header: &[u8]) -> Result<Self> {
        if !has_magic(header, 0, MAGIC) {
            return Err(Error::BadMagic);
        }
        let version = u8_at(header, 0x08)?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(Self {
            underlying_magic: bytesa(header, 0x04)?,
            header_size: le_u16(header, 0x0A)?,
            metadata_size: le_u32(header, 0x0C)?,
            compressed_size: le_u64(header, 0x10)?,
            uncompressed_size: le_u64(header, 0x18)?,
            max_metadata_size: Config::default().limits.max_metadata_size,
            metadata: OnceCell::new(),
        })
    }

    /// Underlying format magic as text, e.g. `NCSD`.
    pub fn underlying_format(&self) -> String {
        fixed_string(&self.underlying_magic)
    }

    /// Offset of the compressed payload.
    pub fn payload_offset(&self) -> u64 {
        u64::from(self.header_size) + u64::from(self.metadata_size)
    }

    /// Metadata items, read on first call.
    ///
    /// Blocks smaller than two bytes or larger than the configured limit
    /// yield no items.
    pub fn metadata_items(&self, file: &SharedFile) -> Track<'_, Vec<MetadataItem>> {
        self.metadata.get_or_init(|| self.read_metadata(file)).as_ref()
    }

    fn read_metadata(&self, file: &SharedFile) -> Result<Vec<MetadataItem>> {
        if self.metadata_size < 2 || self.metadata_size > self.max_metadata_size {
            return Ok(Vec::new());
        }
        let block = file.read_vec_at(HEADER_SIZE as u64, self.metadata_size as usize)?;
        let items = parse_metadata(&block);
        debug!(items = items.len(), "read Z3DS metadata");
        Ok(items)
    }

    /// Magic of the decompressed payload, read from its first bytes.
    #[cfg(feature = "compression")]
    pub fn payload_magic(&self, file: &SharedFile) -> Result<Option<&'static str>> {
        use crate::compression::zstd::decompress_prefix;

        let region = file.region(self.payload_offset(), self.compressed_size);
        let peek = decompress_prefix(region, 0x104)?;
        let magic = if has_magic(&peek, 0x100, b"NCSD") {
            Some("NCSD")
        } else if has_magic(&peek, 0x100, b"NCCH") {
            Some("NCCH")
        } else if has_magic(&peek, 0, b"3DSX") {
            Some("3DSX")
        } else {
            None
        };
        Ok(magic)
    }
}

/// Walk a version 1 item stream. Unknown item types are skipped; an item
/// running past the block ends the walk.
fn parse_metadata(block: &[u8]) -> Vec<MetadataItem> {
    let mut items = Vec::new();
    if block.first() != Some(&METADATA_VERSION) {
        return items;
    }
    let mut p = 1;
    while p + ITEM_HEADER_SIZE < block.len() {
        let kind = block[p];
        if kind == ITEM_END {
            break;
        }
        let key_len = usize::from(block[p + 1]);
        let value_len = usize::from(u16::from_le_bytes([block[p + 2], block[p + 3]]));
        p += ITEM_HEADER_SIZE;
        if p + key_len + value_len > block.len() {
            break;
        }
        if kind == ITEM_BINARY {
            items.push(MetadataItem {
                key: decode_text(&block[p..p + key_len]),
                value: block[p + key_len..p + key_len + value_len].to_vec(),
            });
        }
        p += key_len + value_len;
    }
    items
}

const METADATA_HEADERS: &[&str] = &["Key", "Value"];

impl RomFormat for Z3ds {
    fn system_name(&self) -> &'static str {
        "Nintendo 3DS"
    }

    fn load_fields(&self, file: &SharedFile) -> Result<RomFields> {
        let mut fields = RomFields::new();
        fields.add_string("Underlying Format", self.underlying_format());
        fields.add_hex("Header Size", u64::from(self.header_size), 4);
        fields.add_dec("Compressed Size", self.compressed_size);
        fields.add_dec("Uncompressed Size", self.uncompressed_size);

        match self.metadata_items(file) {
            Ok(items) if !items.is_empty() => {
                let rows = items
                    .iter()
                    .map(|item| vec![item.key.clone(), item.display_value()])
                    .collect();
                fields.add_list("Metadata", METADATA_HEADERS, rows);
            }
            Ok(_) => {}
            Err(e) => fields.add_warning("Metadata", format!("Could not read the metadata: {e}")),
        }

        #[cfg(feature = "compression")]
        match self.payload_magic(file) {
            Ok(Some(magic)) => fields.add_string("Payload", magic),
            Ok(None) => fields.add_string("Payload", "Unknown"),
            Err(e) => fields.add_warning("Payload", e.to_string()),
        }

        Ok(fields)
    }

    fn load_metadata(&self, _file: &SharedFile) -> Result<RomMetaData> {
        let mut meta = RomMetaData::new();
        meta.set(
            Property::Description,
            format!("Zstandard-compressed {}", self.underlying_format()),
        );
        Ok(meta)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
