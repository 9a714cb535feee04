//! GameCube and Wii disc images (`.gcm`, `.iso`).
//!
//! ## Disc header (0x60 bytes read by the detector)
//! ```text
//! [0x000] GameId (ID6: system, game, region, maker)    (6 bytes)
//! [0x006] DiscNumber                                   (u8)
//! [0x007] Revision                                     (u8)
//! [0x018] Wii magic 0x5D1C9EA3                         (u32 BE)
//! [0x01C] GameCube magic 0xC2339F3D                    (u32 BE)
//! [0x020] Title, NUL-padded                            (0x40 bytes)
//! ```
//!
//! ## Boot block and bi2 (GameCube)
//! ```text
//! [0x424] FstOffset                                    (u32 BE)
//! [0x428] FstSize                                      (u32 BE)
//! [0x458] Region (bi2 + 0x18)                          (u32 BE)
//! ```
//! Wii discs keep their region at 0x4E000 instead, and their FST lives in
//! an encrypted partition that this module does not decrypt.
//!
//! ## opening.bnr
//! ```text
//! [0x0000] Magic "BNR1" (US/JP) or "BNR2" (EU)
//! [0x0020] Banner, 96×32 RGB5A3 in 4×4 tiles           (0x1800 bytes)
//! ```

use std::any::Any;
use std::io;

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use super::nintendo::publisher_name;
use crate::config::Config;
use crate::detect::{DetectInfo, Detection, FormatDescriptor, FormatId};
use crate::file::SharedFile;
use crate::fst::Fst;
use crate::rom::{ImageType, PixelFormat, Property, RawImage, RomFields, RomFormat, RomMetaData, Track};
use crate::utils::{be_u32, bytesa, fixed_string, u8_at};
use crate::{Error, Result};

pub const HEADER_SIZE: usize = 0x60;
pub const WII_MAGIC: u32 = 0x5D1C_9EA3;
pub const GCN_MAGIC: u32 = 0xC233_9F3D;

const BOOT_BLOCK_OFFSET: u64 = 0x420;
const BOOT_BLOCK_SIZE: usize = 0x40;
const WII_REGION_OFFSET: u64 = 0x4E000;

const BANNER_WIDTH: u32 = 96;
const BANNER_HEIGHT: u32 = 32;
const BANNER_IMAGE_OFFSET: usize = 0x20;
const BANNER_IMAGE_SIZE: usize = (BANNER_WIDTH * BANNER_HEIGHT * 2) as usize;

pub static DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::GameCubeDisc,
    name: "Nintendo GameCube / Wii disc image",
    extensions: &[".gcm", ".iso"],
    mime_types: &["application/x-gamecube-rom", "application/x-wii-rom"],
    header_size: HEADER_SIZE,
    detect,
    open,
};

/// Which console the disc is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscSystem {
    GameCube,
    Wii,
}

pub fn detect(info: &DetectInfo<'_>) -> Option<Detection> {
    disc_system(info)?;
    Some(Detection::ranked(
        FormatId::GameCubeDisc,
        info.ext_in(DESCRIPTOR.extensions),
    ))
}

fn disc_system(info: &DetectInfo<'_>) -> Option<DiscSystem> {
    if !info.has_header(HEADER_SIZE) {
        return None;
    }
    if be_u32(info.header, 0x18).ok()? == WII_MAGIC {
        Some(DiscSystem::Wii)
    } else if be_u32(info.header, 0x1C).ok()? == GCN_MAGIC {
        Some(DiscSystem::GameCube)
    } else {
        None
    }
}

fn open(file: &SharedFile, header: &[u8], config: &Config) -> Result<Box<dyn RomFormat>> {
    let info = DetectInfo::new(header, file.extension(), file.size());
    let system = disc_system(&info).ok_or(Error::BadMagic)?;
    let mut disc = GameCubeDisc::parse(header, system)?;
    disc.max_fst_size = config.limits.max_fst_size;

    match system {
        DiscSystem::GameCube => {
            let mut boot = [0u8; BOOT_BLOCK_SIZE];
            file.read_exact_at(BOOT_BLOCK_OFFSET, &mut boot)?;
            disc.fst_offset = be_u32(&boot, 0x04)?;
            disc.fst_size = be_u32(&boot, 0x08)?;
            disc.region = Some(be_u32(&boot, 0x38)?);
        }
        DiscSystem::Wii => {
            // Truncated dumps may end before the region setting.
            let mut region = [0u8; 4];
            if file.read_exact_at(WII_REGION_OFFSET, &mut region).is_ok() {
                disc.region = Some(u32::from_be_bytes(region));
            }
        }
    }
    Ok(Box::new(disc))
}

/// Decoded disc header plus the lazily loaded FST.
#[derive(Debug)]
pub struct GameCubeDisc {
    pub system: DiscSystem,
    pub game_id: [u8; 6],
    pub disc_number: u8,
    pub revision: u8,
    pub title: String,
    /// bi2 (GameCube) or region setting (Wii) value.
    pub region: Option<u32>,
    pub fst_offset: u32,
    pub fst_size: u32,
    max_fst_size: u32,
    fst: OnceCell<Result<Fst>>,
}

impl GameCubeDisc {
    pub fn parse(header: &[u8], system: DiscSystem) -> Result<Self> {
        Ok(Self {
            system,
            game_id: bytesa(header, 0x00)?,
            disc_number: u8_at(header, 0x06)?,
            revision: u8_at(header, 0x07)?,
            title: fixed_string(&bytesa::<0x40>(header, 0x20)?),
            region: None,
            fst_offset: 0,
            fst_size: 0,
            max_fst_size: Config::default().limits.max_fst_size,
            fst: OnceCell::new(),
        })
    }

    /// ID6 with unprintable bytes replaced by `_`.
    pub fn game_id_string(&self) -> String {
        self.game_id
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { '_' })
            .collect()
    }

    pub fn publisher(&self) -> String {
        publisher_name([self.game_id[4], self.game_id[5]])
    }

    pub fn region_name(&self) -> Option<String> {
        self.region.map(region_name)
    }

    /// The disc's FST, read on first call.
    ///
    /// Wii discs fail with [`Error::NotSupported`]. GameCube tables are
    /// checked against the file size and the configured maximum before
    /// anything is allocated.
    pub fn fst(&self, file: &SharedFile) -> Track<'_, Fst> {
        self.fst.get_or_init(|| self.load_fst(file)).as_ref()
    }

    fn load_fst(&self, file: &SharedFile) -> Result<Fst> {
        if self.system == DiscSystem::Wii {
            return Err(Error::NotSupported);
        }
        if self.fst_size == 0 || self.fst_size > self.max_fst_size {
            trace!(fst_size = self.fst_size, max = self.max_fst_size, "FST size rejected");
            return Err(Error::InvalidRange);
        }
        let end = u64::from(self.fst_offset) + u64::from(self.fst_size);
        if end > file.size() {
            return Err(Error::InvalidRange);
        }
        let buf = file.read_vec_at(u64::from(self.fst_offset), self.fst_size as usize)?;
        let fst = Fst::parse_gcn(&buf, 0)?;
        debug!(files = fst.file_count(), "loaded GameCube FST");
        Ok(fst)
    }

    fn banner(&self, file: &SharedFile) -> Result<RawImage> {
        let fst = self.fst(file).map_err(owned)?;
        let entry = fst.find_path("/opening.bnr")?;
        if (entry.size as usize) < BANNER_IMAGE_OFFSET + BANNER_IMAGE_SIZE {
            return Err(Error::Corrupt("opening.bnr is too small"));
        }
        let bnr = file.read_vec_at(entry.offset, BANNER_IMAGE_OFFSET + BANNER_IMAGE_SIZE)?;
        if &bnr[..4] != b"BNR1" && &bnr[..4] != b"BNR2" {
            return Err(Error::BadMagic);
        }
        Ok(RawImage {
            width: BANNER_WIDTH,
            height: BANNER_HEIGHT,
            format: PixelFormat::Rgb5A3Tiled,
            data: bnr[BANNER_IMAGE_OFFSET..].to_vec(),
        })
    }
}

/// Owned copy of a cached FST failure, in the same error class.
fn owned(e: &Error) -> Error {
    match e {
        Error::NotSupported => Error::NotSupported,
        Error::InvalidRange => Error::InvalidRange,
        Error::BadMagic => Error::BadMagic,
        Error::UnsupportedVersion(v) => Error::UnsupportedVersion(*v),
        Error::UnterminatedName => Error::UnterminatedName,
        Error::Corrupt(what) => Error::Corrupt(what),
        Error::NotFound => Error::NotFound,
        Error::NotADirectory => Error::NotADirectory,
        Error::InvalidRom => Error::InvalidRom,
        Error::UnexpectedEof => Error::UnexpectedEof,
        Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
        other => Error::Io(io::Error::other(other.to_string())),
    }
}

fn region_name(code: u32) -> String {
    match code {
        0 => "Japan".to_owned(),
        1 => "USA".to_owned(),
        2 => "Europe".to_owned(),
        3 => "Region-Free".to_owned(),
        4 => "South Korea".to_owned(),
        5 => "China".to_owned(),
        6 => "Taiwan".to_owned(),
        n => format!("Unknown (0x{n:08X})"),
    }
}

impl RomFormat for GameCubeDisc {
    fn system_name(&self) -> &'static str {
        match self.system {
            DiscSystem::GameCube => "Nintendo GameCube",
            DiscSystem::Wii => "Nintendo Wii",
        }
    }

    fn load_fields(&self, file: &SharedFile) -> Result<RomFields> {
        let mut fields = RomFields::new();
        fields.add_string("Title", self.title.clone());
        fields.add_string("Game ID", self.game_id_string());
        fields.add_string("Publisher", self.publisher());
        fields.add_dec("Disc #", u64::from(self.disc_number) + 1);
        fields.add_dec("Revision", u64::from(self.revision));
        if let Some(region) = self.region_name() {
            fields.add_string("Region Code", region);
        }

        if self.system == DiscSystem::GameCube {
            match self.fst(file) {
                Ok(fst) => {
                    fields.add_dec("Files", u64::from(fst.file_count() - 1));
                    match fst.total_used_size() {
                        Ok(size) => fields.add_dec("Used Size", size),
                        Err(e) => fields.add_warning("Used Size", e.to_string()),
                    }
                }
                Err(e) => fields.add_warning("Files", format!("Could not read the FST: {e}")),
            }
        }
        Ok(fields)
    }

    fn load_metadata(&self, _file: &SharedFile) -> Result<RomMetaData> {
        let mut meta = RomMetaData::new();
        meta.set(Property::Title, self.title.clone());
        meta.set(Property::Publisher, self.publisher());
        meta.set(Property::GameId, self.game_id_string());
        if let Some(region) = self.region_name() {
            meta.set(Property::Region, region);
        }
        Ok(meta)
    }

    fn supported_images(&self) -> &'static [ImageType] {
        match self.system {
            DiscSystem::GameCube => &[ImageType::InternalBanner],
            DiscSystem::Wii => &[],
        }
    }

    fn load_image(&self, file: &SharedFile, kind: ImageType) -> Result<RawImage> {
        match kind {
            ImageType::InternalBanner if self.system == DiscSystem::GameCube => self.banner(file),
            _ => Err(Error::NotSupported),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn header(magic_offset: usize, magic: u32) -> Vec<u8> {
        let mut h = vec![0u8; HEADER_SIZE];
        h[..6].copy_from_slice(b"GALE01");
        h[0x20..0x2B].copy_from_slice(b"Super Smash");
        h[magic_offset..magic_offset + 4].copy_from_slice(&magic.to_be_bytes());
        h
    }

    #[rstest]
    #[case(Some(".iso"), true)]
    #[case(Some(".GCM"), true)]
    #[case(Some(".bin"), false)]
    #[case(None, false)]
    fn extension_ranks_the_accept(#[case] ext: Option<&str>, #[case] exact: bool) {
        let h = header(0x1C, GCN_MAGIC);
        let hit = detect(&DetectInfo::new(&h, ext, 0x100000)).unwrap();
        assert_eq!(hit, Detection::ranked(FormatId::GameCubeDisc, exact));
    }

    #[test]
    fn wii_magic_wins() {
        let h = header(0x18, WII_MAGIC);
        assert_eq!(disc_system(&DetectInfo::new(&h, None, 0)), Some(DiscSystem::Wii));
        let h = header(0x1C, 0);
        assert!(detect(&DetectInfo::new(&h, None, 0)).is_none());
    }

    /// Seeks anywhere, fails every read at or past `readable`.
    struct BadSectors {
        data: io::Cursor<Vec<u8>>,
        readable: u64,
    }

    impl io::Read for BadSectors {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.position() >= self.readable {
                return Err(io::Error::other("bad sector"));
            }
            io::Read::read(&mut self.data, buf)
        }
    }

    impl io::Seek for BadSectors {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            io::Seek::seek(&mut self.data, pos)
        }
    }

    #[test]
    fn unreadable_fst_stays_an_io_error() {
        let source = BadSectors {
            data: io::Cursor::new(vec![0u8; 0x2000]),
            readable: 0x1000,
        };
        let file = SharedFile::from_reader(source, Some("disc.iso")).unwrap();
        let mut disc = GameCubeDisc::parse(&header(0x1C, GCN_MAGIC), DiscSystem::GameCube).unwrap();
        disc.fst_offset = 0x1000;
        disc.fst_size = 0x100;

        assert!(matches!(disc.fst(&file), Err(Error::Io(_))));
        let err = disc.banner(&file).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::Other), "{err:?}");
        assert!(!err.is_corrupt());
    }

    #[rstest]
    #[case(Error::UnexpectedEof, false)]
    #[case(Error::Io(io::Error::other("bad sector")), false)]
    #[case(Error::NotSupported, false)]
    #[case(Error::InvalidRange, true)]
    #[case(Error::UnterminatedName, true)]
    #[case(Error::Corrupt("FST root file count is invalid"), true)]
    fn cached_failures_keep_their_class(#[case] cached: Error, #[case] corrupt: bool) {
        let copy = owned(&cached);
        assert_eq!(copy.is_corrupt(), corrupt);
        assert_eq!(copy.to_string(), cached.to_string());
    }

    #[test]
    fn header_fields() {
        let mut h = header(0x1C, GCN_MAGIC);
        h[3] = 0;
        let disc = GameCubeDisc::parse(&h, DiscSystem::GameCube).unwrap();
        assert_eq!(disc.title, "Super Smash");
        assert_eq!(disc.game_id_string(), "GAL_01");
        assert_eq!(disc.publisher(), "Nintendo");
        assert_eq!(region_name(2), "Europe");
        assert_eq!(region_name(9), "Unknown (0x00000009)");
    }
}
