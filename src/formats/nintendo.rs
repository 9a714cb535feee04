//! Lookups shared by several Nintendo formats.

/// Two-character maker codes used by cartridge and disc headers.
static PUBLISHERS: &[(&[u8; 2], &str)] = &[
    (b"01", "Nintendo"),
    (b"08", "Capcom"),
    (b"13", "Electronic Arts Japan"),
    (b"18", "Hudson Soft"),
    (b"41", "Ubisoft"),
    (b"52", "Activision"),
    (b"5D", "Midway"),
    (b"69", "Electronic Arts"),
    (b"78", "THQ"),
    (b"8P", "Sega"),
    (b"A4", "Konami"),
    (b"AF", "Namco"),
    (b"GD", "Square Enix"),
];

/// Publisher name for a maker code, or a generic label.
pub(crate) fn publisher_name(code: [u8; 2]) -> String {
    if let Some((_, name)) = PUBLISHERS.iter().find(|(c, _)| **c == code) {
        return (*name).to_owned();
    }
    if code.iter().all(u8::is_ascii_alphanumeric) {
        format!("Unknown ({}{})", char::from(code[0]), char::from(code[1]))
    } else {
        format!("Unknown ({:02X}{:02X})", code[0], code[1])
    }
}

/// `XXXXXXXX-XXXXXXXX` rendering of a 64-bit title ID.
pub(crate) fn title_id_string(title_id: u64) -> String {
    format!("{:08X}-{:08X}", title_id >> 32, title_id & 0xFFFF_FFFF)
}

/// System a title ID belongs to, from its top 16 bits.
pub(crate) fn title_id_system(title_id: u64) -> Option<&'static str> {
    match title_id >> 48 {
        0 | 1 => Some("Nintendo Wii"),
        2 => Some("GBA NetCard"),
        3 => Some("Nintendo DSi"),
        4 => Some("Nintendo 3DS"),
        5 | 7 => Some("Nintendo Wii U"),
        _ => None,
    }
}
