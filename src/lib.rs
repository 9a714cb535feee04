//! **romkit** - identify console ROM, disc and title metadata files and
//! read their header information.
//!
//! A [`RomFactory`] probes a file against every registered format, binds it
//! to the best match and hands back a [`RomData`] whose display fields,
//! metadata and embedded images load lazily on first access.
//!
//! ```no_run
//! use romkit::{Config, RomFactory};
//!
//! let factory = RomFactory::new(Config::default());
//! if let Some(rom) = factory.open_path("game.iso")? {
//!     for field in rom.fields().map_err(|e| e.to_string())?.iter() {
//!         println!("{}: {}", field.name, field.value);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::gamecube`]   | GCM / ISO - GameCube and Wii disc images |
//! | [`formats::wiiu_disc`]  | WUD - Wii U disc images |
//! | [`formats::gba`]        | GBA - Game Boy Advance cartridge dumps |
//! | [`formats::wii_ticket`] | TIK - title tickets |
//! | [`formats::wii_tmd`]    | TMD - title metadata |
//! | [`formats::z3ds`]       | Z3DS - Zstandard-compressed 3DS images |
//!
//! [`fst`] parses the GameCube/Wii and Wii U file system tables on its own.

pub mod checksum;
pub mod compression;
pub mod config;
pub mod detect;
pub mod error;
pub mod file;
pub mod formats;
pub mod fst;
pub mod rom;
pub(crate) mod utils;

pub use config::Config;
pub use detect::{Confidence, DetectInfo, Detection, FormatDescriptor, FormatId};
pub use error::{Error, Result};
pub use file::SharedFile;
pub use fst::{DirEntry, Fst, FstDir, FstFormat};
pub use rom::{RomData, RomFactory, RomFormat, Validity};
