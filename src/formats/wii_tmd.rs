//! Title metadata (`.tmd`): the signed list of a title's contents.
//!
//! ## Header (0x1E4 bytes)
//! ```text
//! [0x000] SignatureType                  (u32 BE)
//! [0x004] Signature (RSA-2048)           (0x100 bytes)
//! [0x104] Padding                        (0x3C bytes)
//! [0x140] Issuer, NUL-padded             (0x40 bytes)
//! [0x180] FormatVersion                  (u8)
//! [0x181] CaCrlVersion                   (u8)
//! [0x182] SignerCrlVersion               (u8)
//! [0x183] Reserved                       (u8)
//! [0x184] SystemVersion (OS title ID)    (u64 BE)
//! [0x18C] TitleId                        (u64 BE)
//! [0x194] TitleType                      (u32 BE)
//! [0x198] GroupId                        (u16 BE)
//! [0x19A] Reserved                       (2 bytes)
//! [0x19C] Region                         (u16 BE)
//! [0x19E] Ratings, IPC mask, reserved    (0x3A bytes)
//! [0x1D8] AccessRights                   (u32 BE)
//! [0x1DC] TitleVersion                   (u16 BE)
//! [0x1DE] ContentCount                   (u16 BE)
//! [0x1E0] BootIndex                      (u16 BE)
//! [0x1E2] Padding                        (u16)
//! ```
//!
//! ## v0 contents (at 0x1E4, 0x24 bytes each)
//! ```text
//! [0x00] ContentId (u32) [0x04] Index (u16) [0x06] Type (u16)
//! [0x08] Size (u64)      [0x10] SHA-1 (0x14 bytes)
//! ```
//!
//! ## v1 content metadata groups (at 0x1E4)
//! ```text
//! [0x000] SHA-256 over the 64 group records     (0x20 bytes)
//! [0x020] Group records, 64 × 0x24:
//!         [0x00] First content index (u16)
//!         [0x02] Content count       (u16)
//!         [0x04] SHA-256 over the group's content records (0x20 bytes)
//! [0x920] Content records, 0x30 each:
//!         [0x00] ContentId (u32) [0x04] Index (u16) [0x06] Type (u16)
//!         [0x08] Size (u64)      [0x10] SHA-256 (0x20 bytes)
//! ```
//! Groups are used in order until the first one with a zero count.

use std::any::Any;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::nintendo::{title_id_string, title_id_system};
use super::signed::{self, SignedBlob, SizeException};
use crate::checksum::{self, Algorithm};
use crate::config::Config;
use crate::detect::{DetectInfo, Detection, FormatDescriptor, FormatId};
use crate::file::SharedFile;
use crate::rom::{Property, RomFields, RomFormat, RomMetaData, Track};
use crate::utils::{be_u16, be_u32, be_u64, bytesa, u8_at};
use crate::Result;

pub const HEADER_SIZE: usize = 0x1E4;
const V0_CONTENT_SIZE: usize = 0x24;
const CMD_GROUP_COUNT: usize = 64;
const CMD_GROUP_SIZE: usize = 0x24;
const CMD_HEADER_SIZE: usize = 0x20 + CMD_GROUP_COUNT * CMD_GROUP_SIZE;
const V1_CONTENT_SIZE: usize = 0x30;

const BLOB: SignedBlob = SignedBlob {
    format: FormatId::WiiTmd,
    extensions: &[".tmd"],
    header_size: HEADER_SIZE,
    version_offset: 0x180,
    title_id_offset: 0x18C,
    min_sizes: &[
        (HEADER_SIZE + V0_CONTENT_SIZE) as u64,
        (HEADER_SIZE + CMD_HEADER_SIZE + CMD_GROUP_SIZE + V1_CONTENT_SIZE) as u64,
    ],
    exceptions: &[
        // Wii U boot1's TMD is one group record short of the formula.
        SizeException {
            version: 1,
            title_id: 0x0005_0010_1000_0100,
            file_size: 2868,
        },
    ],
};

pub static DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::WiiTmd,
    name: "Nintendo Wii TMD",
    extensions: &[".tmd"],
    mime_types: &["application/x-nintendo-tmd"],
    header_size: HEADER_SIZE,
    detect,
    open,
};

pub fn detect(info: &DetectInfo<'_>) -> Option<Detection> {
    BLOB.detect(info)
}

fn open(_file: &SharedFile, header: &[u8], _config: &Config) -> Result<Box<dyn RomFormat>> {
    Ok(Box::new(WiiTmd::parse(header)?))
}

/// One content record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub id: u32,
    pub index: u16,
    pub content_type: u16,
    pub size: u64,
}

/// Integrity of the v1 content metadata groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCheck {
    /// v0 TMDs have no groups.
    NotPresent,
    Ok { groups: usize },
    /// The hash over the group records does not match.
    HeaderMismatch,
    /// Group `n`'s hash over its content records does not match.
    GroupMismatch(usize),
    /// A group references content records past the end of the table.
    GroupOutOfRange(usize),
}

/// Content table plus its group check, read from the file on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTable {
    pub contents: Vec<Content>,
    pub groups: GroupCheck,
}

/// Decoded TMD header.
#[derive(Debug)]
pub struct WiiTmd {
    pub issuer: String,
    pub format_version: u8,
    pub sys_version: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    pub region: u16,
    pub access_rights: u32,
    pub title_version: u16,
    pub content_count: u16,
    pub boot_index: u16,
    contents: OnceCell<Result<ContentTable>>,
}

impl WiiTmd {
    pub fn parse(header: &[u8]) -> Result<Self> {
        Ok(Self {
            issuer: signed::issuer(header)?,
            format_version: u8_at(header, 0x180)?,
            sys_version: be_u64(header, 0x184)?,
            title_id: be_u64(header, 0x18C)?,
            title_type: be_u32(header, 0x194)?,
            group_id: be_u16(header, 0x198)?,
            region: be_u16(header, 0x19C)?,
            access_rights: be_u32(header, 0x1D8)?,
            title_version: be_u16(header, 0x1DC)?,
            content_count: be_u16(header, 0x1DE)?,
            boot_index: be_u16(header, 0x1E0)?,
            contents: OnceCell::new(),
        })
    }

    /// Content records, read and verified on first call.
    pub fn content_table(&self, file: &SharedFile) -> Track<'_, ContentTable> {
        self.contents
            .get_or_init(|| self.read_content_table(file))
            .as_ref()
    }

    fn read_content_table(&self, file: &SharedFile) -> Result<ContentTable> {
        let count = usize::from(self.content_count);
        if self.format_version == 0 {
            let raw = file.read_vec_at(HEADER_SIZE as u64, count * V0_CONTENT_SIZE)?;
            let contents = raw
                .chunks_exact(V0_CONTENT_SIZE)
                .map(parse_content)
                .collect::<Result<Vec<_>>>()?;
            return Ok(ContentTable {
                contents,
                groups: GroupCheck::NotPresent,
            });
        }

        let cmd = file.read_vec_at(HEADER_SIZE as u64, CMD_HEADER_SIZE)?;
        let raw = file.read_vec_at((HEADER_SIZE + CMD_HEADER_SIZE) as u64, count * V1_CONTENT_SIZE)?;
        let contents = raw
            .chunks_exact(V1_CONTENT_SIZE)
            .map(parse_content)
            .collect::<Result<Vec<_>>>()?;
        let groups = check_groups(&cmd, &raw)?;
        debug!(?groups, contents = contents.len(), "read TMD content table");
        Ok(ContentTable { contents, groups })
    }

    /// Human-readable name of the OS this title runs on.
    pub fn os_version(&self) -> Option<String> {
        if self.sys_version == 0 {
            return None;
        }
        let hi = (self.sys_version >> 32) as u32;
        let lo = self.sys_version as u32;
        let name = match hi {
            0x0000_0001 => match lo {
                1 => Some("boot2".to_owned()),
                2 => Some("System Menu".to_owned()),
                256 => Some("BC".to_owned()),
                257 => Some("MIOS".to_owned()),
                512 => Some("BC-NAND".to_owned()),
                513 => Some("BC-WFS".to_owned()),
                n if n < 256 => Some(format!("IOS{n}")),
                _ => None,
            },
            0x0005_0010 if lo & 0xFFFF_3F00 == 0x1000_0000 => match lo & 0xC000 {
                0x4000 => Some(format!("OSv{} NDEBUG", lo & 0xFF)),
                0x8000 => Some(format!("OSv{} DEBUG", lo & 0xFF)),
                _ => None,
            },
            _ => None,
        };
        Some(name.unwrap_or_else(|| title_id_string(self.sys_version)))
    }
}

fn parse_content(rec: &[u8]) -> Result<Content> {
    Ok(Content {
        id: be_u32(rec, 0x00)?,
        index: be_u16(rec, 0x04)?,
        content_type: be_u16(rec, 0x06)?,
        size: be_u64(rec, 0x08)?,
    })
}

fn check_groups(cmd: &[u8], contents: &[u8]) -> Result<GroupCheck> {
    let expected: [u8; 32] = bytesa(cmd, 0)?;
    let records = &cmd[0x20..];
    if !checksum::verify(Algorithm::Sha256, records, &expected) {
        return Ok(GroupCheck::HeaderMismatch);
    }

    let mut groups = 0;
    for (i, rec) in records.chunks_exact(CMD_GROUP_SIZE).enumerate() {
        let first = usize::from(be_u16(rec, 0)?);
        let count = usize::from(be_u16(rec, 2)?);
        if count == 0 {
            break;
        }
        let range = first * V1_CONTENT_SIZE..(first + count) * V1_CONTENT_SIZE;
        let Some(slice) = contents.get(range) else {
            return Ok(GroupCheck::GroupOutOfRange(i));
        };
        if !checksum::verify(Algorithm::Sha256, slice, &rec[4..0x24]) {
            return Ok(GroupCheck::GroupMismatch(i));
        }
        groups += 1;
    }
    Ok(GroupCheck::Ok { groups })
}

const ACCESS_RIGHTS: &[&str] = &["AHBPROT", "DVD Video"];
const CONTENT_HEADERS: &[&str] = &["#", "Index", "ID", "Type", "Size"];

impl RomFormat for WiiTmd {
    fn system_name(&self) -> &'static str {
        title_id_system(self.title_id).unwrap_or("Nintendo")
    }

    fn load_fields(&self, file: &SharedFile) -> Result<RomFields> {
        let mut fields = RomFields::new();
        fields.add_string("Title ID", title_id_string(self.title_id));
        fields.add_string("Issuer", self.issuer.clone());
        let v = self.title_version;
        fields.add_string("Title Version", format!("{}.{} (v{v})", v >> 8, v & 0xFF));
        if let Some(os) = self.os_version() {
            fields.add_string("OS Version", os);
        }
        if matches!(self.title_id >> 48, 1 | 5) {
            fields.add_bitfield("Access Rights", ACCESS_RIGHTS, self.access_rights);
        }

        // A damaged content table costs only these fields.
        match self.content_table(file) {
            Ok(table) => {
                let rows = table
                    .contents
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        vec![
                            i.to_string(),
                            c.index.to_string(),
                            format!("{:08X}", c.id),
                            format!("0x{:04X}", c.content_type),
                            c.size.to_string(),
                        ]
                    })
                    .collect();
                fields.add_list("Contents", CONTENT_HEADERS, rows);
                match table.groups {
                    GroupCheck::NotPresent => {}
                    GroupCheck::Ok { groups } => fields.add_string("Content Groups", format!("{groups} (hashes OK)")),
                    GroupCheck::HeaderMismatch => {
                        fields.add_warning("Content Groups", "Content group table hash mismatch.")
                    }
                    GroupCheck::GroupMismatch(i) => {
                        fields.add_warning("Content Groups", format!("Content group {i} hash mismatch."))
                    }
                    GroupCheck::GroupOutOfRange(i) => {
                        fields.add_warning("Content Groups", format!("Content group {i} is out of range."))
                    }
                }
            }
            Err(e) => fields.add_warning("Contents", format!("Could not read the content table: {e}")),
        }
        Ok(fields)
    }

    fn load_metadata(&self, _file: &SharedFile) -> Result<RomMetaData> {
        let mut meta = RomMetaData::new();
        let title_id = title_id_string(self.title_id);
        meta.set(Property::Title, title_id.clone());
        meta.set(Property::TitleId, title_id);
        if let Some(os) = self.os_version() {
            meta.set(Property::OsVersion, os);
        }
        Ok(meta)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
