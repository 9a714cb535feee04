//! Title tickets (`.tik`) for Wii, DSi, 3DS and Wii U titles.
//!
//! ## Layout (v0, 0x2A4 bytes; v1 tickets are 0x350 bytes)
//! ```text
//! [0x000] SignatureType                  (u32 BE)
//! [0x004] Signature (RSA-2048)           (0x100 bytes)
//! [0x104] Padding                        (0x3C bytes)
//! [0x140] Issuer, NUL-padded             (0x40 bytes)
//! [0x180] ECDH data                      (0x3C bytes)
//! [0x1BC] FormatVersion                  (u8)
//! [0x1BD] Reserved                       (2 bytes)
//! [0x1BF] Encrypted title key            (0x10 bytes)
//! [0x1CF] Unknown                        (u8)
//! [0x1D0] TicketId                       (u64 BE)
//! [0x1D8] ConsoleId                      (u32 BE)
//! [0x1DC] TitleId                        (u64 BE)
//! [0x1E4] Unknown                        (u16)
//! [0x1E6] TitleVersion                   (u16 BE)
//! [0x1E8] Permitted titles / masks       (9 bytes)
//! [0x1F1] CommonKeyIndex                 (u8)
//! [0x1F2] ...                            (to 0x2A4)
//! ```
//!
//! The title key itself is never decrypted here; only the name of the
//! common key it is encrypted with is reported.

use std::any::Any;

use super::nintendo::{title_id_string, title_id_system};
use super::signed::{self, SignedBlob, SizeException};
use crate::Result;
use crate::config::Config;
use crate::detect::{DetectInfo, Detection, FormatDescriptor, FormatId};
use crate::file::SharedFile;
use crate::rom::{Property, RomFields, RomFormat, RomMetaData};
use crate::utils::{bytesa, be_u16, be_u32, be_u64, u8_at};

pub const TICKET_V0_SIZE: usize = 0x2A4;
pub const TICKET_V1_SIZE: usize = 0x350;

const BLOB: SignedBlob = SignedBlob {
    format: FormatId::WiiTicket,
    extensions: &[".tik"],
    header_size: TICKET_V0_SIZE,
    version_offset: 0x1BC,
    title_id_offset: 0x1DC,
    min_sizes: &[TICKET_V0_SIZE as u64, TICKET_V1_SIZE as u64],
    exceptions: &[
        // Wii U boot1 ships a v1 ticket only 20 bytes larger than v0.
        SizeException {
            version: 1,
            title_id: 0x0005_0010_1000_0100,
            file_size: TICKET_V0_SIZE as u64 + 20,
        },
    ],
};

pub static DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::WiiTicket,
    name: "Nintendo Wii Ticket",
    extensions: &[".tik"],
    mime_types: &["application/x-nintendo-ticket"],
    header_size: TICKET_V0_SIZE,
    detect,
    open,
};

pub fn detect(info: &DetectInfo<'_>) -> Option<Detection> {
    BLOB.detect(info)
}

fn open(_file: &SharedFile, header: &[u8], _config: &Config) -> Result<Box<dyn RomFormat>> {
    Ok(Box::new(WiiTicket::parse(header)?))
}

/// Common keys a title key can be encrypted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionKey {
    Retail,
    Korean,
    VWii,
    Debug,
    KoreanDebug,
    VWiiDebug,
    RetailWiiU,
    DebugWiiU,
    RetailNetCard,
    DebugNetCard,
}

impl EncryptionKey {
    pub fn name(self) -> &'static str {
        match self {
            EncryptionKey::Retail => "Retail",
            EncryptionKey::Korean => "Korean",
            EncryptionKey::VWii => "vWii",
            EncryptionKey::Debug => "Debug",
            EncryptionKey::KoreanDebug => "Korean (debug)",
            EncryptionKey::VWiiDebug => "vWii (debug)",
            EncryptionKey::RetailWiiU => "Retail (Wii U)",
            EncryptionKey::DebugWiiU => "Debug (Wii U)",
            EncryptionKey::RetailNetCard => "Retail (iQue NetCard)",
            EncryptionKey::DebugNetCard => "Debug (iQue NetCard)",
        }
    }

    /// Select the key from the issuer's CA/XS pair and the ticket's common
    /// key index. Wii keys come in three flavours picked by the index; out
    /// of range indexes fall back to the first.
    pub fn lookup(ca: u32, xs: u32, common_key_index: u8) -> Option<Self> {
        const RETAIL: [EncryptionKey; 3] = [EncryptionKey::Retail, EncryptionKey::Korean, EncryptionKey::VWii];
        const DEBUG: [EncryptionKey; 3] = [
            EncryptionKey::Debug,
            EncryptionKey::KoreanDebug,
            EncryptionKey::VWiiDebug,
        ];
        let idx = if common_key_index > 2 { 0 } else { usize::from(common_key_index) };
        match (ca, xs) {
            (1, 3) => Some(RETAIL[idx]),
            (2, 6) => Some(DEBUG[idx]),
            (3, 0xC) => Some(EncryptionKey::RetailWiiU),
            (4, 0xF) | (4, 0x9) => Some(EncryptionKey::DebugWiiU),
            (0x1E, 0x1F) => Some(EncryptionKey::DebugNetCard),
            (0x111, 0x114) => Some(EncryptionKey::RetailNetCard),
            _ => None,
        }
    }
}

/// Decoded ticket header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiiTicket {
    pub signature_type: u32,
    pub issuer: String,
    pub format_version: u8,
    pub enc_title_key: [u8; 16],
    pub ticket_id: u64,
    pub console_id: u32,
    pub title_id: u64,
    pub title_version: u16,
    pub common_key_index: u8,
}

impl WiiTicket {
    /// Decode the v0 portion of a ticket, shared by every version.
    pub fn parse(header: &[u8]) -> Result<Self> {
        Ok(Self {
            signature_type: be_u32(header, 0x000)?,
            issuer: signed::issuer(header)?,
            format_version: u8_at(header, 0x1BC)?,
            enc_title_key: bytesa(header, 0x1BF)?,
            ticket_id: be_u64(header, 0x1D0)?,
            console_id: be_u32(header, 0x1D8)?,
            title_id: be_u64(header, 0x1DC)?,
            title_version: be_u16(header, 0x1E6)?,
            common_key_index: u8_at(header, 0x1F1)?,
        })
    }

    pub fn encryption_key(&self) -> Option<EncryptionKey> {
        let (ca, xs) = signed::parse_issuer(&self.issuer)?;
        EncryptionKey::lookup(ca, xs, self.common_key_index)
    }
}

impl RomFormat for WiiTicket {
    fn system_name(&self) -> &'static str {
        title_id_system(self.title_id).unwrap_or("Nintendo")
    }

    fn load_fields(&self, _file: &SharedFile) -> Result<RomFields> {
        let mut fields = RomFields::new();
        fields.add_string("Title ID", title_id_string(self.title_id));
        fields.add_string("Issuer", self.issuer.clone());
        fields.add_hex("Console ID", u64::from(self.console_id), 8);
        fields.add_dec("Key Index", u64::from(self.common_key_index));
        match self.encryption_key() {
            Some(key) => fields.add_string("Encryption Key", key.name()),
            None => fields.add_warning("Warning", "Could not determine the required encryption key."),
        }
        Ok(fields)
    }

    fn load_metadata(&self, _file: &SharedFile) -> Result<RomMetaData> {
        let mut meta = RomMetaData::new();
        let title_id = title_id_string(self.title_id);
        meta.set(Property::Title, title_id.clone());
        meta.set(Property::TitleId, title_id);
        if let Some(key) = self.encryption_key() {
            meta.set(Property::EncryptionKey, key.name());
        }
        Ok(meta)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, 3, 0, Some(EncryptionKey::Retail))]
    #[case(1, 3, 1, Some(EncryptionKey::Korean))]
    #[case(1, 3, 2, Some(EncryptionKey::VWii))]
    #[case(1, 3, 9, Some(EncryptionKey::Retail))]
    #[case(2, 6, 2, Some(EncryptionKey::VWiiDebug))]
    #[case(4, 9, 0, Some(EncryptionKey::DebugWiiU))]
    #[case(5, 5, 0, None)]
    fn key_lookup(#[case] ca: u32, #[case] xs: u32, #[case] idx: u8, #[case] expected: Option<EncryptionKey>) {
        assert_eq!(EncryptionKey::lookup(ca, xs, idx), expected);
    }

    #[rstest]
    #[case(16)]
    #[case(signed::ISSUER_OFFSET + 8)]
    #[case(0x1F1)]
    fn short_header_is_an_error(#[case] len: usize) {
        let err = WiiTicket::parse(&vec![0u8; len]).unwrap_err();
        assert!(err.is_corrupt(), "{err:?}");
    }
}
