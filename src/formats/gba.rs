//! Game Boy Advance cartridge dumps (`.gba`, `.agb`, `.mb`).
//!
//! ## Header (0xC0 bytes)
//! ```text
//! [0x00] Entry point, usually an ARM `B` instruction   (u32 LE)
//! [0x04] Nintendo logo                                 (0x9C bytes)
//! [0xA0] Title, NUL-padded                             (12 bytes)
//! [0xAC] Game code                                     (4 bytes)
//! [0xB0] Maker code                                    (2 bytes)
//! [0xB2] Fixed 0x96                                    (u8)
//! [0xB3] Main unit code                                (u8)
//! [0xB4] Device type                                   (u8)
//! [0xB5] Reserved                                      (7 bytes)
//! [0xBC] Software version                              (u8)
//! [0xBD] Header checksum over 0xA0..=0xBC              (u8)
//! [0xBE] Reserved                                      (2 bytes)
//! ```
//!
//! Cartridges without the logo are accepted only when the fixed byte, the
//! device type and the header checksum all agree. An entry point of
//! 0xFFFFFFFF marks a Nintendo DS expansion cartridge; anything else is a
//! pass-through device.

use std::any::Any;

use tracing::trace;

use super::nintendo::publisher_name;
use crate::checksum::{self, Algorithm};
use crate::config::Config;
use crate::detect::{DetectInfo, Detection, FormatDescriptor, FormatId};
use crate::file::SharedFile;
use crate::rom::{Property, RomFields, RomFormat, RomMetaData};
use crate::utils::{bytesa, fixed_string, has_magic, le_u32, u8_at};
use crate::{Error, Result};

pub const HEADER_SIZE: usize = 0xC0;

const LOGO_OFFSET: usize = 0x04;
const LOGO_PREFIX: [u8; 16] = [
    0x24, 0xFF, 0xAE, 0x51, 0x69, 0x9A, 0xA2, 0x21, 0x3D, 0x84, 0x82, 0x0A, 0x84, 0xE4, 0x09, 0xAD,
];
const CHECKSUM_RANGE: std::ops::RangeInclusive<usize> = 0xA0..=0xBC;
const CHECKSUM_OFFSET: usize = 0xBD;

pub static DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::GameBoyAdvance,
    name: "Nintendo Game Boy Advance ROM",
    extensions: &[".gba", ".agb", ".mb"],
    mime_types: &["application/x-gba-rom"],
    header_size: HEADER_SIZE,
    detect,
    open,
};

/// What kind of cartridge the header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomType {
    Gba,
    /// Unlicensed device without the logo, e.g. a cheat cartridge.
    PassThrough,
    /// Nintendo DS expansion cartridge. Not bootable.
    NdsExpansion,
}

pub fn detect(info: &DetectInfo<'_>) -> Option<Detection> {
    rom_type(info)?;
    Some(Detection::ranked(
        FormatId::GameBoyAdvance,
        info.ext_in(DESCRIPTOR.extensions),
    ))
}

fn rom_type(info: &DetectInfo<'_>) -> Option<RomType> {
    if !info.has_header(HEADER_SIZE) {
        return None;
    }
    let h = info.header;
    if has_magic(h, LOGO_OFFSET, &LOGO_PREFIX) {
        return Some(RomType::Gba);
    }
    if h[0xB2] != 0x96 || h[0xB4] != 0 {
        return None;
    }
    if !header_checksum_ok(h) {
        trace!("GBA header without logo has a bad checksum");
        return None;
    }
    if le_u32(h, 0).ok()? == 0xFFFF_FFFF {
        Some(RomType::NdsExpansion)
    } else {
        Some(RomType::PassThrough)
    }
}

fn header_checksum_ok(h: &[u8]) -> bool {
    checksum::verify(Algorithm::GbaHeader, &h[CHECKSUM_RANGE], &h[CHECKSUM_OFFSET..=CHECKSUM_OFFSET])
}

fn open(file: &SharedFile, header: &[u8], _config: &Config) -> Result<Box<dyn RomFormat>> {
    let info = DetectInfo::new(header, file.extension(), file.size());
    let rom_type = rom_type(&info).ok_or(Error::BadMagic)?;
    // Licensed carts must still carry a correct checksum to boot.
    if !header_checksum_ok(header) {
        return Err(Error::Corrupt("GBA header checksum mismatch"));
    }
    Ok(Box::new(GameBoyAdvance::parse(header, rom_type)?))
}

/// Decoded cartridge header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameBoyAdvance {
    pub rom_type: RomType,
    pub entry_point: u32,
    pub title: String,
    pub id6: [u8; 6],
    pub version: u8,
    pub checksum: u8,
    pub debug_enable: u8,
}

impl GameBoyAdvance {
    pub fn parse(header: &[u8], rom_type: RomType) -> Result<Self> {
        Ok(Self {
            rom_type,
            entry_point: le_u32(header, 0x00)?,
            title: fixed_string(&bytesa::<12>(header, 0xA0)?),
            id6: bytesa(header, 0xAC)?,
            version: u8_at(header, 0xBC)?,
            checksum: u8_at(header, CHECKSUM_OFFSET)?,
            debug_enable: u8_at(header, 0x9C)?,
        })
    }

    /// Game code plus maker code, unprintable bytes replaced by `_`.
    pub fn game_id(&self) -> String {
        self.id6
            .iter()
            .map(|&b| if b.is_ascii_graphic() { char::from(b) } else { '_' })
            .collect()
    }

    pub fn publisher(&self) -> String {
        publisher_name([self.id6[4], self.id6[5]])
    }

    /// Branch target of the entry point, if it is an unconditional `B`.
    ///
    /// The ARM pipeline puts the target two words past the encoded offset.
    pub fn branch_target(&self) -> Option<u32> {
        if self.entry_point >> 24 != 0xEA {
            return None;
        }
        let mut target = ((self.entry_point.wrapping_add(2)) & 0x00FF_FFFF) << 2;
        if target & 0x0200_0000 != 0 {
            target |= 0xFC00_0000;
        }
        Some(target)
    }
}

impl RomFormat for GameBoyAdvance {
    fn system_name(&self) -> &'static str {
        "Nintendo Game Boy Advance"
    }

    fn load_fields(&self, _file: &SharedFile) -> Result<RomFields> {
        let mut fields = RomFields::new();
        fields.add_string("Title", self.title.clone());
        fields.add_string("Game ID", self.game_id());
        fields.add_string("Publisher", self.publisher());
        fields.add_dec("Revision", u64::from(self.version));
        match self.rom_type {
            RomType::NdsExpansion => fields.add_string("Entry Point", "Not bootable (Nintendo DS expansion)"),
            RomType::Gba | RomType::PassThrough => match self.branch_target() {
                Some(target) => fields.add_hex("Entry Point", u64::from(target), 8),
                None => fields.add_string("Entry Point", hex::encode_upper(self.entry_point.to_le_bytes())),
            },
        }
        if self.rom_type == RomType::Gba {
            let enabled = self.debug_enable & 0xA5 == 0xA5;
            fields.add_string("Enable Debug", if enabled { "Yes" } else { "No" });
        }
        fields.add_hex("Checksum", u64::from(self.checksum), 2);
        Ok(fields)
    }

    fn load_metadata(&self, _file: &SharedFile) -> Result<RomMetaData> {
        let mut meta = RomMetaData::new();
        meta.set(Property::Title, self.title.clone());
        meta.set(Property::Publisher, self.publisher());
        meta.set(Property::GameId, self.game_id());
        Ok(meta)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
