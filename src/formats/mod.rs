//! Per-format detectors and parsers.
//!
//! Every submodule exports a `DESCRIPTOR` registered in
//! [`crate::detect::REGISTRY`] and a type implementing
//! [`crate::rom::RomFormat`]. All of them follow the same conventions:
//!
//! * **Detection is pure** - the detector only looks at the probe, never at
//!   the file. Checks that need bytes outside the probe are requested as a
//!   confirmation read.
//! * **Headers are copied once** - `open` decodes the header bytes it was
//!   handed into a plain struct. Anything further into the file is read
//!   lazily by the track or sub-structure that needs it.
//! * **Sizes are checked before allocation** - every buffer sized from an
//!   on-disk field is validated against the file size and the configured
//!   limits first.
//!
//! ## Format overview
//!
//! | Module         | Format          | Description |
//! |----------------|-----------------|-------------|
//! | [`gamecube`]   | GCM / ISO       | GameCube and Wii disc images; GameCube FST and banner |
//! | [`wiiu_disc`]  | WUD             | Wii U disc images |
//! | [`gba`]        | GBA             | Game Boy Advance cartridge dumps |
//! | [`wii_ticket`] | TIK             | Wii / Wii U / 3DS / DSi title tickets |
//! | [`wii_tmd`]    | TMD             | Title metadata with content records |
//! | [`z3ds`]       | Z3DS            | Zstandard-compressed Nintendo 3DS images |

pub mod gamecube;
pub mod gba;
pub(crate) mod nintendo;
pub(crate) mod signed;
pub mod wii_ticket;
pub mod wii_tmd;
pub mod wiiu_disc;
pub mod z3ds;
