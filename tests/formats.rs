use std::io::{Cursor, Write};

use romkit::checksum::{self, Algorithm};
use romkit::formats::gamecube::GameCubeDisc;
use romkit::formats::wii_tmd::{GroupCheck, WiiTmd};
use romkit::rom::{FieldValue, ImageType, Property, RawImage};
use romkit::{Config, Error, FormatId, RomData, RomFactory, SharedFile, Validity};

fn shared(data: Vec<u8>, name: &str) -> SharedFile {
    SharedFile::from_reader(Cursor::new(data), Some(name)).unwrap()
}

fn open(data: Vec<u8>, name: &str) -> Option<RomData> {
    RomFactory::default().open(shared(data, name)).unwrap()
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

// Tickets

fn ticket(issuer: &[u8], key_index: u8) -> Vec<u8> {
    let mut t = vec![0u8; 0x2A4];
    put(&mut t, 0, &0x0001_0001u32.to_be_bytes());
    put(&mut t, 0x140, issuer);
    put(&mut t, 0x1D8, &0x1234_5678u32.to_be_bytes());
    put(&mut t, 0x1DC, &0x0001_0001_5241_4C45u64.to_be_bytes());
    t[0x1F1] = key_index;
    t
}

#[test]
fn ticket_fields_and_metadata() {
    let rom = open(ticket(b"Root-CA00000001-XS00000003", 1), "title.tik").unwrap();
    assert_eq!(rom.format_id(), Some(FormatId::WiiTicket));
    assert_eq!(rom.system_name(), Some("Nintendo Wii"));

    let fields = rom.fields().unwrap();
    assert_eq!(fields.get_str("Title ID"), Some("00010001-52414C45"));
    assert_eq!(fields.get_str("Encryption Key"), Some("Korean"));
    assert_eq!(fields.get("Console ID").unwrap().to_string(), "0x12345678");

    let meta = rom.metadata().unwrap();
    assert_eq!(meta.get(Property::TitleId), Some("00010001-52414C45"));
    assert_eq!(meta.get(Property::EncryptionKey), Some("Korean"));
}

#[test]
fn ticket_with_unknown_issuer_warns() {
    let rom = open(ticket(b"Root-CA00000099-XS00000099", 0), "title.tik").unwrap();
    let fields = rom.fields().unwrap();
    assert!(matches!(fields.get("Warning"), Some(FieldValue::Warning(_))));
    assert_eq!(rom.metadata().unwrap().get(Property::EncryptionKey), None);
}

// TMDs

fn tmd_header(sig_type: u32, version: u8, contents: u16) -> Vec<u8> {
    let mut t = vec![0u8; 0x1E4];
    put(&mut t, 0, &sig_type.to_be_bytes());
    put(&mut t, 0x140, b"Root-CA00000001-CP00000004");
    t[0x180] = version;
    put(&mut t, 0x184, &0x0000_0001_0000_0024u64.to_be_bytes());
    put(&mut t, 0x18C, &0x0001_0000_4841_4241u64.to_be_bytes());
    put(&mut t, 0x1D8, &1u32.to_be_bytes());
    put(&mut t, 0x1DC, &0x0203u16.to_be_bytes());
    put(&mut t, 0x1DE, &contents.to_be_bytes());
    t
}

fn content_record(id: u32, index: u16, size: u64, hash_len: usize) -> Vec<u8> {
    let mut rec = Vec::new();
    rec.extend_from_slice(&id.to_be_bytes());
    rec.extend_from_slice(&index.to_be_bytes());
    rec.extend_from_slice(&1u16.to_be_bytes());
    rec.extend_from_slice(&size.to_be_bytes());
    rec.resize(16 + hash_len, 0xCD);
    rec
}

#[test]
fn tmd_v0_lists_contents() {
    let mut data = tmd_header(0x0001_0001, 0, 2);
    data.extend(content_record(0x10, 0, 0x4000, 20));
    data.extend(content_record(0x11, 1, 0x8000, 20));

    let rom = open(data, "title.tmd").unwrap();
    let fields = rom.fields().unwrap();
    assert_eq!(fields.get_str("Title Version"), Some("2.3 (v515)"));
    assert_eq!(fields.get_str("OS Version"), Some("IOS36"));
    assert_eq!(fields.get("Access Rights").unwrap().to_string(), "AHBPROT");
    match fields.get("Contents") {
        Some(FieldValue::List { rows, .. }) => {
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[1][2], "00000011");
        }
        other => panic!("unexpected contents field: {other:?}"),
    }
    assert_eq!(rom.metadata().unwrap().get(Property::OsVersion), Some("IOS36"));
}

fn tmd_v1(corrupt_content: bool) -> Vec<u8> {
    let mut records = content_record(0x20, 0, 0x1000, 32);
    records.extend(content_record(0x21, 1, 0x2000, 32));

    let mut groups = vec![0u8; 64 * 0x24];
    put(&mut groups, 0, &0u16.to_be_bytes());
    put(&mut groups, 2, &2u16.to_be_bytes());
    put(&mut groups, 4, checksum::digest(Algorithm::Sha256, &records).as_bytes());

    let mut data = tmd_header(0x0001_0004, 1, 2);
    data.extend_from_slice(checksum::digest(Algorithm::Sha256, &groups).as_bytes());
    data.extend(groups);
    if corrupt_content {
        records[0] ^= 0xFF;
    }
    data.extend(records);
    data
}

#[test]
fn tmd_v1_verifies_content_groups() {
    let rom = open(tmd_v1(false), "title.tmd").unwrap();
    assert_eq!(rom.fields().unwrap().get_str("Content Groups"), Some("1 (hashes OK)"));

    let tmd = rom.format_as::<WiiTmd>().unwrap();
    let table = tmd.content_table(rom.file().unwrap()).unwrap();
    assert_eq!(table.contents.len(), 2);
    assert_eq!(table.contents[1].size, 0x2000);
    assert_eq!(table.groups, GroupCheck::Ok { groups: 1 });
}

#[test]
fn tmd_v1_reports_hash_mismatch() {
    let rom = open(tmd_v1(true), "title.tmd").unwrap();
    let fields = rom.fields().unwrap();
    assert!(matches!(fields.get("Content Groups"), Some(FieldValue::Warning(_))));
    let tmd = rom.format_as::<WiiTmd>().unwrap();
    let table = tmd.content_table(rom.file().unwrap()).unwrap();
    assert_eq!(table.groups, GroupCheck::GroupMismatch(0));
}

#[test]
fn tmd_content_table_is_bounded_by_file_size() {
    let mut data = tmd_header(0x0001_0001, 0, 200);
    data.extend(content_record(0x10, 0, 0x4000, 20));
    let rom = open(data, "title.tmd").unwrap();
    let fields = rom.fields().unwrap();
    assert!(matches!(fields.get("Contents"), Some(FieldValue::Warning(_))));
    assert_eq!(fields.get_str("OS Version"), Some("IOS36"));
}

// Wii U discs

fn wud(with_secondary_magic: bool) -> Vec<u8> {
    let mut data = vec![0u8; 0x20000];
    put(&mut data, 0, b"WUP-P-ARPE-00-551USA-0");
    if with_secondary_magic {
        put(&mut data, 0x10000, &0xCC54_9EB9u32.to_be_bytes());
    }
    data
}

#[test]
fn wud_confirmed_by_secondary_magic() {
    let rom = open(wud(true), "game.wud").unwrap();
    assert!(rom.detection().unwrap().is_provisional());
    let fields = rom.fields().unwrap();
    assert_eq!(fields.get_str("Game ID"), Some("WUP-P-ARPE"));
    assert_eq!(fields.get_str("OS Version"), Some("5.5.1"));
    assert_eq!(fields.get("Disc #").unwrap().to_string(), "0");
    assert_eq!(rom.metadata().unwrap().get(Property::Region), Some("USA"));
}

#[test]
fn wud_without_secondary_magic_is_rejected() {
    assert!(open(wud(false), "game.wud").is_none());

    let file = shared(wud(false), "game.wud");
    let desc = romkit::detect::descriptor(FormatId::WiiUDisc).unwrap();
    let rom = RomData::open(file, desc, &Config::default());
    assert_eq!(rom.validity(), Validity::Invalid);
}

// GameCube / Wii discs

const FST_OFFSET: usize = 0x500;
const BNR_OFFSET: usize = 0x1000;
const BNR_SIZE: usize = 0x1960;

fn gamecube_disc() -> Vec<u8> {
    let mut data = vec![0u8; BNR_OFFSET + BNR_SIZE];
    put(&mut data, 0, b"GALE01");
    put(&mut data, 0x1C, &0xC233_9F3Du32.to_be_bytes());
    put(&mut data, 0x20, b"Super Smash Bros. Melee");

    let mut fst = Vec::new();
    for (type_name, a, b) in [(0x0100_0000u32, 0u32, 2u32), (0, BNR_OFFSET as u32, BNR_SIZE as u32)] {
        fst.extend_from_slice(&type_name.to_be_bytes());
        fst.extend_from_slice(&a.to_be_bytes());
        fst.extend_from_slice(&b.to_be_bytes());
    }
    fst.extend_from_slice(b"opening.bnr\0");

    put(&mut data, 0x424, &(FST_OFFSET as u32).to_be_bytes());
    put(&mut data, 0x428, &(fst.len() as u32).to_be_bytes());
    put(&mut data, 0x458, &1u32.to_be_bytes());
    put(&mut data, FST_OFFSET, &fst);

    put(&mut data, BNR_OFFSET, b"BNR1");
    for (i, b) in data[BNR_OFFSET + 0x20..BNR_OFFSET + 0x1820].iter_mut().enumerate() {
        *b = i as u8;
    }
    data
}

#[test]
fn gamecube_fields_fst_and_banner() {
    let rom = open(gamecube_disc(), "melee.iso").unwrap();
    assert_eq!(rom.system_name(), Some("Nintendo GameCube"));

    let fields = rom.fields().unwrap();
    assert_eq!(fields.get_str("Title"), Some("Super Smash Bros. Melee"));
    assert_eq!(fields.get_str("Publisher"), Some("Nintendo"));
    assert_eq!(fields.get_str("Region Code"), Some("USA"));
    assert_eq!(fields.get("Disc #").unwrap().to_string(), "1");
    assert_eq!(fields.get("Files").unwrap().to_string(), "1");
    assert_eq!(fields.get("Used Size").unwrap().to_string(), BNR_SIZE.to_string());

    assert_eq!(rom.supported_images(), &[ImageType::InternalBanner]);
    let banner = rom.image(ImageType::InternalBanner).unwrap();
    let raw = banner.downcast_ref::<RawImage>().unwrap();
    assert_eq!((raw.width, raw.height), (96, 32));
    assert_eq!(raw.data.len(), 0x1800);
    assert_eq!(raw.data[5], 5);
    assert!(matches!(rom.image(ImageType::InternalIcon), Err(Error::NotSupported)));
}

#[test]
fn gamecube_fst_respects_size_limit() {
    let mut config = Config::default();
    config.limits.max_fst_size = 8;
    let rom = RomFactory::new(config).open(shared(gamecube_disc(), "melee.gcm")).unwrap().unwrap();
    let fields = rom.fields().unwrap();
    assert!(matches!(fields.get("Files"), Some(FieldValue::Warning(_))));
    assert!(rom.image(ImageType::InternalBanner).is_err());
    // The header-only tracks still work.
    assert_eq!(rom.metadata().unwrap().get(Property::GameId), Some("GALE01"));
}

#[test]
fn disabled_images_are_not_supported() {
    let config = Config::from_toml_str("[images]\nenabled = false\n").unwrap();
    let rom = RomFactory::new(config).open(shared(gamecube_disc(), "melee.iso")).unwrap().unwrap();
    assert!(rom.supported_images().is_empty());
    assert!(matches!(rom.image(ImageType::InternalBanner), Err(Error::NotSupported)));
}

#[test]
fn wii_disc_has_no_fst() {
    let mut data = vec![0u8; 0x100];
    put(&mut data, 0, b"RSBE01");
    put(&mut data, 0x18, &0x5D1C_9EA3u32.to_be_bytes());
    put(&mut data, 0x20, b"Super Smash Bros. Brawl");

    let rom = open(data, "brawl.iso").unwrap();
    assert_eq!(rom.system_name(), Some("Nintendo Wii"));
    let disc = rom.format_as::<GameCubeDisc>().unwrap();
    assert!(matches!(disc.fst(rom.file().unwrap()), Err(Error::NotSupported)));
    assert!(rom.supported_images().is_empty());
    assert_eq!(rom.fields().unwrap().get_str("Title"), Some("Super Smash Bros. Brawl"));
}

// Game Boy Advance

fn gba_rom() -> Vec<u8> {
    let mut data = vec![0u8; 0x200];
    put(&mut data, 0, &0xEA00_002Eu32.to_le_bytes());
    put(
        &mut data,
        4,
        &[0x24, 0xFF, 0xAE, 0x51, 0x69, 0x9A, 0xA2, 0x21, 0x3D, 0x84, 0x82, 0x0A, 0x84, 0xE4, 0x09, 0xAD],
    );
    put(&mut data, 0xA0, b"POKEMON EMER");
    put(&mut data, 0xAC, b"BPEE01");
    data[0xB2] = 0x96;
    data[0xBD] = checksum::digest(Algorithm::GbaHeader, &data[0xA0..=0xBC]).as_bytes()[0];
    data
}

#[test]
fn gba_from_disk() {
    let mut tmp = tempfile::Builder::new().suffix(".gba").tempfile().unwrap();
    tmp.write_all(&gba_rom()).unwrap();
    tmp.flush().unwrap();

    let rom = RomFactory::default().open_path(tmp.path()).unwrap().unwrap();
    assert_eq!(rom.format_id(), Some(FormatId::GameBoyAdvance));
    let fields = rom.fields().unwrap();
    assert_eq!(fields.get_str("Title"), Some("POKEMON EMER"));
    assert_eq!(fields.get_str("Game ID"), Some("BPEE01"));
    assert_eq!(fields.get("Entry Point").unwrap().to_string(), "0x000000C0");
}

#[test]
fn gba_checksum_mismatch_is_invalid() {
    let mut data = gba_rom();
    data[0xBD] ^= 1;
    assert!(open(data, "game.gba").is_none());
}

// Z3DS

fn z3ds(payload: &[u8]) -> Vec<u8> {
    let mut meta = vec![1u8];
    meta.extend_from_slice(&[1, 10, 6, 0]);
    meta.extend_from_slice(b"compressor");
    meta.extend_from_slice(b"Azahar");
    meta.extend_from_slice(&[0, 0, 0, 0]);
    meta.resize(0x20, 0);

    let mut data = vec![0u8; 0x20];
    put(&mut data, 0, b"Z3DS");
    put(&mut data, 4, b"NCSD");
    data[8] = 1;
    put(&mut data, 0x0A, &0x20u16.to_le_bytes());
    put(&mut data, 0x0C, &(meta.len() as u32).to_le_bytes());
    put(&mut data, 0x10, &(payload.len() as u64).to_le_bytes());
    put(&mut data, 0x18, &0x4000u64.to_le_bytes());
    data.extend(meta);
    data.extend_from_slice(payload);
    data
}

#[test]
fn z3ds_metadata_items() {
    let rom = open(z3ds(&[0xAA; 16]), "game.zcci").unwrap();
    let fields = rom.fields().unwrap();
    assert_eq!(fields.get_str("Underlying Format"), Some("NCSD"));
    match fields.get("Metadata") {
        Some(FieldValue::List { rows, .. }) => {
            assert_eq!(rows, &vec![vec!["compressor".to_owned(), "Azahar".to_owned()]]);
        }
        other => panic!("unexpected metadata field: {other:?}"),
    }
}

#[test]
fn z3ds_payload_must_start_in_file() {
    let mut data = z3ds(&[]);
    data.truncate(0x40);
    assert!(open(data, "game.zcci").is_none());
}

#[cfg(feature = "compression")]
#[test]
fn z3ds_payload_magic() {
    let mut plain = vec![0u8; 0x200];
    put(&mut plain, 0x100, b"NCSD");
    let packed = zstd::encode_all(&plain[..], 3).unwrap();
    let rom = open(z3ds(&packed), "game.zcci").unwrap();
    assert_eq!(rom.fields().unwrap().get_str("Payload"), Some("NCSD"));
}

#[test]
fn unknown_data_yields_no_instance() {
    assert!(open(vec![0x42; 0x1000], "mystery.bin").is_none());
    assert!(open(Vec::new(), "empty").is_none());
}
