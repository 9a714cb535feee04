//! Wii U disc images (`.wud`).
//!
//! ## Header (0x60 bytes read)
//! ```text
//! [0x00] "WUP-" + product code, e.g. "WUP-P-ARPE" (10 bytes)
//! [0x0A] '-'
//! [0x0B] Version, e.g. "00"       (2 bytes)
//! [0x0D] '-'
//! [0x0E] OS version, e.g. "551"   (3 bytes)
//! [0x11] Region code, e.g. "USA"  (3 bytes)
//! [0x14] '-'
//! [0x15] Disc number              (ASCII digit)
//! [0x18] GameCube/Wii magic area, must be empty
//! ```
//!
//! The partition table starts at 0x18000 and carries its own magic at
//! 0x10000, which the detector cannot see and asks the parser instance to
//! confirm.

use std::any::Any;

use tracing::trace;

use crate::Result;
use crate::config::Config;
use crate::detect::{DetectInfo, Detection, FormatDescriptor, FormatId};
use crate::file::SharedFile;
use crate::rom::{Property, RomFields, RomFormat, RomMetaData};
use crate::utils::{be_u32, bytesa, decode_text, has_magic, u8_at};

pub const HEADER_SIZE: usize = 0x60;
pub const MIN_FILE_SIZE: u64 = 0x20000;

const MAGIC: &[u8] = b"WUP-";
const HYPHENS: [usize; 4] = [0x05, 0x0A, 0x0D, 0x14];
const SECONDARY_MAGIC_OFFSET: u64 = 0x10000;
const SECONDARY_MAGIC: &[u8] = &[0xCC, 0x54, 0x9E, 0xB9];

const WII_MAGIC: u32 = 0x5D1C_9EA3;
const GCN_MAGIC: u32 = 0xC233_9F3D;

pub static DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::WiiUDisc,
    name: "Nintendo Wii U disc image",
    extensions: &[".wud"],
    mime_types: &["application/x-wii-u-rom"],
    header_size: HEADER_SIZE,
    detect,
    open,
};

pub fn detect(info: &DetectInfo<'_>) -> Option<Detection> {
    if !info.has_header(HEADER_SIZE) || info.file_size < MIN_FILE_SIZE {
        return None;
    }
    let h = info.header;
    if !has_magic(h, 0, MAGIC) {
        return None;
    }
    if HYPHENS.iter().any(|&off| h[off] != b'-') {
        trace!("Wii U product code is missing a hyphen");
        return None;
    }
    if be_u32(h, 0x18).ok()? == WII_MAGIC || be_u32(h, 0x1C).ok()? == GCN_MAGIC {
        trace!("GameCube/Wii magic present in a Wii U header");
        return None;
    }
    Some(
        Detection::ranked(FormatId::WiiUDisc, info.ext_in(DESCRIPTOR.extensions))
            .needs_confirmation(SECONDARY_MAGIC_OFFSET, SECONDARY_MAGIC),
    )
}

fn open(_file: &SharedFile, header: &[u8], _config: &Config) -> Result<Box<dyn RomFormat>> {
    Ok(Box::new(WiiUDisc::parse(header)?))
}

/// Decoded disc header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiiUDisc {
    pub id: [u8; 10],
    pub version: [u8; 2],
    pub os_version: [u8; 3],
    pub region: [u8; 3],
    pub disc_number: u8,
}

impl WiiUDisc {
    pub fn parse(header: &[u8]) -> Result<Self> {
        Ok(Self {
            id: bytesa(header, 0x00)?,
            version: bytesa(header, 0x0B)?,
            os_version: bytesa(header, 0x0E)?,
            region: bytesa(header, 0x11)?,
            disc_number: u8_at(header, 0x15)?,
        })
    }

    /// Product code, e.g. `WUP-P-ARPE`.
    pub fn game_id(&self) -> String {
        decode_text(&self.id)
    }

    /// `x.y.z` from the three OS version digits.
    pub fn os_version(&self) -> String {
        let [a, b, c] = self.os_version.map(char::from);
        format!("{a}.{b}.{c}")
    }

    pub fn region_code(&self) -> String {
        decode_text(&self.region)
    }
}

impl RomFormat for WiiUDisc {
    fn system_name(&self) -> &'static str {
        "Nintendo Wii U"
    }

    fn load_fields(&self, _file: &SharedFile) -> Result<RomFields> {
        let mut fields = RomFields::new();
        fields.add_string("Game ID", self.game_id());
        fields.add_string("Version", decode_text(&self.version));
        fields.add_string("OS Version", self.os_version());
        fields.add_string("Region Code", self.region_code());
        // Stored as an ASCII digit.
        match self.disc_number {
            d @ b'0'..=b'9' => fields.add_dec("Disc #", u64::from(d - b'0')),
            d => fields.add_hex("Disc #", u64::from(d), 2),
        }
        Ok(fields)
    }

    fn load_metadata(&self, _file: &SharedFile) -> Result<RomMetaData> {
        let mut meta = RomMetaData::new();
        meta.set(Property::GameId, self.game_id());
        meta.set(Property::Region, self.region_code());
        Ok(meta)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
