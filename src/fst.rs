//! FST - disc File System Table.
//!
//! A directory tree stored as a flat array of entries followed by a pool of
//! NUL-terminated names. Entry 0 is the root. A directory at index `i` owns
//! every entry in `[i + 1, next_index)`, recursively, so a scan over a
//! directory's children must jump from each nested directory straight to
//! that directory's `next_index`.
//!
//! Two on-disk layouts are supported. Both are big-endian.
//!
//! ## Wii U
//! ```text
//! [0x00] Magic "FST\0"                (u32)
//! [0x04] FileOffsetFactor             (u32)
//! [0x08] SecondaryHeaderCount         (u32)
//! [0x0C] Reserved                     (0x14 bytes)
//! [0x20] SecondaryHeaders             (count × 0x20 bytes)
//!        Entries                      (file_count × 0x10 bytes)
//!        StringPool
//! ```
//!
//! ### Secondary header (0x20 bytes)
//! ```text
//! [0x00] Offset                       (u32)
//! [0x04] Size                         (u32)
//! [0x08] OwnerId                      (u64)
//! [0x10] GroupId                      (u32)
//! [0x14] Reserved                     (0x0C bytes)
//! ```
//!
//! ### Entry (0x10 bytes)
//! ```text
//! [0x00] Type (top byte, 1 = dir) | NameOffset (low 24 bits)   (u32)
//! [0x04] root: reserved | dir: parent index | file: offset     (u32)
//! [0x08] root: file_count | dir: next_index | file: size       (u32)
//! [0x0C] Flags                        (u16)
//! [0x0E] StorageClusterIndex          (u16)
//! ```
//! File offsets are multiplied by `FileOffsetFactor`.
//!
//! ## GameCube / Wii
//! No header. Entries are 0x0C bytes (the first three words above) and
//! file offsets are shifted left by 0 (GameCube) or 2 (Wii).
//!
//! ## Notes
//! * `file_count` counts every entry including the root.
//! * The string pool may not contain `/`.
//! * Every traversal moves strictly forward through the entry array. A
//!   `next_index` that does not point past its own entry is reported as
//!   [`Error::Corrupt`], so corrupt tables cannot cause loops.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::utils::{be_u16, be_u32, be_u64, decode_text};
use crate::{Error, Result};

const WIIU_MAGIC: &[u8; 4] = b"FST\0";
const WIIU_HEADER_SIZE: usize = 0x20;
const WIIU_SECONDARY_HEADER_SIZE: usize = 0x20;
const WIIU_ENTRY_SIZE: usize = 0x10;
const GCN_ENTRY_SIZE: usize = 0x0C;

/// Smallest buffer a Wii U FST can occupy.
pub const WIIU_MIN_SIZE: usize = WIIU_HEADER_SIZE + WIIU_SECONDARY_HEADER_SIZE + WIIU_ENTRY_SIZE;

/// Which on-disk layout a buffer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FstFormat {
    WiiU,
    /// `offset_shift` is 0 for GameCube discs and 2 for Wii partitions.
    GameCube { offset_shift: u8 },
}

/// One Wii U secondary header, describing a content group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryHeader {
    pub offset: u32,
    pub size: u32,
    pub owner_id: u64,
    pub group_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Result of a lookup or enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Index in the entry array.
    pub index: u32,
    pub kind: EntryKind,
    /// Empty for the root.
    pub name: Arc<str>,
    /// Byte offset with the format's multiplier applied. 0 for directories.
    pub offset: u64,
    /// 0 for directories.
    pub size: u64,
    pub storage_cluster: u16,
    pub flags: u16,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[derive(Debug, Clone, Copy)]
struct RawEntry {
    is_dir: bool,
    name_offset: u32,
    /// Parent index or file offset.
    a: u32,
    /// File count (root), next index (directory) or file size.
    b: u32,
    flags: u16,
    storage_cluster: u16,
}

/// A parsed, read-only FST.
pub struct Fst {
    /// Copy of the caller's buffer plus one trailing NUL.
    data: Box<[u8]>,
    format: FstFormat,
    entries_offset: usize,
    entry_size: usize,
    file_count: u32,
    string_table_offset: usize,
    string_table_len: usize,
    offset_multiplier: u64,
    secondary_headers: Vec<SecondaryHeader>,
    names: Mutex<HashMap<u32, Arc<str>>>,
    open_dirs: AtomicUsize,
    has_errors: AtomicBool,
}

impl Fst {
    /// Parse a Wii U FST.
    pub fn parse_wiiu(buf: &[u8]) -> Result<Self> {
        Self::parse(buf, FstFormat::WiiU)
    }

    /// Parse a GameCube (`offset_shift = 0`) or Wii (`offset_shift = 2`) FST.
    pub fn parse_gcn(buf: &[u8], offset_shift: u8) -> Result<Self> {
        Self::parse(buf, FstFormat::GameCube { offset_shift })
    }

    /// Validate `buf` and copy it into a new index.
    ///
    /// Fails with [`Error::Corrupt`] (or [`Error::BadMagic`]) unless the
    /// buffer is large enough, the entry array and string pool are in
    /// bounds, the root's file count is plausible and the pool contains no
    /// `/`.
    pub fn parse(buf: &[u8], format: FstFormat) -> Result<Self> {
        let (entries_offset, entry_size, offset_multiplier, secondary_headers) = match format {
            FstFormat::WiiU => {
                if buf.len() < WIIU_MIN_SIZE {
                    return Err(Error::Corrupt("FST is smaller than its minimum size"));
                }
                if &buf[..4] != WIIU_MAGIC {
                    return Err(Error::BadMagic);
                }
                let factor = be_u32(buf, 0x04)?;
                let count = be_u32(buf, 0x08)? as usize;
                let entries_offset = count
                    .checked_mul(WIIU_SECONDARY_HEADER_SIZE)
                    .and_then(|n| n.checked_add(WIIU_HEADER_SIZE))
                    .filter(|&off| off < buf.len())
                    .ok_or(Error::Corrupt("FST entry table is out of bounds"))?;
                let headers = (0..count)
                    .map(|i| parse_secondary_header(buf, WIIU_HEADER_SIZE + i * WIIU_SECONDARY_HEADER_SIZE))
                    .collect::<Result<Vec<_>>>()?;
                (entries_offset, WIIU_ENTRY_SIZE, u64::from(factor), headers)
            }
            FstFormat::GameCube { offset_shift } => {
                if buf.len() < GCN_ENTRY_SIZE {
                    return Err(Error::Corrupt("FST is smaller than its minimum size"));
                }
                if offset_shift > 2 {
                    return Err(Error::Corrupt("unsupported FST offset shift"));
                }
                (0, GCN_ENTRY_SIZE, 1u64 << offset_shift, Vec::new())
            }
        };

        if entries_offset + entry_size > buf.len() {
            return Err(Error::Corrupt("FST root entry is out of bounds"));
        }

        // Root entry: file_count lives where a directory keeps next_index.
        let root = read_entry(buf, entries_offset, entry_size)?;
        let file_count = root.b;
        let max_entries = (buf.len() - entries_offset) / entry_size;
        if !root.is_dir || file_count <= 1 || file_count as usize > max_entries {
            return Err(Error::Corrupt("FST root file count is invalid"));
        }

        let string_table_offset = entries_offset + file_count as usize * entry_size;
        if string_table_offset >= buf.len() {
            return Err(Error::Corrupt("FST string table is out of bounds"));
        }
        let pool = &buf[string_table_offset..];
        if memchr::memchr(b'/', pool).is_some() {
            return Err(Error::Corrupt("FST string table contains a path separator"));
        }

        let mut data = Vec::with_capacity(buf.len() + 1);
        data.extend_from_slice(buf);
        data.push(0);
        trace!(?format, file_count, "parsed FST");

        Ok(Self {
            data: data.into_boxed_slice(),
            format,
            entries_offset,
            entry_size,
            file_count,
            string_table_offset,
            string_table_len: pool.len(),
            offset_multiplier,
            secondary_headers,
            names: Mutex::new(HashMap::with_capacity(file_count as usize - 1)),
            open_dirs: AtomicUsize::new(0),
            has_errors: AtomicBool::new(false),
        })
    }

    pub fn format(&self) -> FstFormat {
        self.format
    }

    /// Number of entries, root included.
    pub fn file_count(&self) -> u32 {
        self.file_count
    }

    /// Wii U secondary headers. Empty for GameCube/Wii tables.
    pub fn secondary_headers(&self) -> &[SecondaryHeader] {
        &self.secondary_headers
    }

    /// Whether any query has run into corrupt data.
    pub fn has_errors(&self) -> bool {
        self.has_errors.load(Ordering::Relaxed)
    }

    /// Number of directory cursors currently open.
    pub fn open_dirs(&self) -> usize {
        self.open_dirs.load(Ordering::Acquire)
    }

    fn flag(&self, what: &'static str) {
        self.has_errors.store(true, Ordering::Relaxed);
        warn!(what, "corrupt FST");
    }

    fn corrupt(&self, what: &'static str) -> Error {
        self.flag(what);
        Error::Corrupt(what)
    }

    fn raw(&self, idx: u32) -> Result<RawEntry> {
        if idx >= self.file_count {
            return Err(self.corrupt("FST entry index is out of range"));
        }
        read_entry(
            &self.data,
            self.entries_offset + idx as usize * self.entry_size,
            self.entry_size,
        )
    }

    /// Decoded name for `entry`, memoized by string pool offset.
    fn name(&self, entry: &RawEntry) -> Result<Arc<str>> {
        let offset = entry.name_offset;
        if let Some(name) = self.names.lock().get(&offset) {
            return Ok(name.clone());
        }
        if offset as usize >= self.string_table_len {
            return Err(self.corrupt("FST name offset is beyond the string table"));
        }
        let start = self.string_table_offset + offset as usize;
        let end = self.string_table_offset + self.string_table_len;
        let len = memchr::memchr(0, &self.data[start..end])
            .ok_or_else(|| {
                self.flag("FST name is not terminated");
                Error::UnterminatedName
            })?;
        let name: Arc<str> = decode_text(&self.data[start..start + len]).into();
        self.names.lock().insert(offset, name.clone());
        Ok(name)
    }

    fn to_dir_entry(&self, idx: u32, raw: &RawEntry, name: Arc<str>) -> DirEntry {
        let (kind, offset, size) = if raw.is_dir {
            (EntryKind::Directory, 0, 0)
        } else {
            (
                EntryKind::File,
                u64::from(raw.a) * self.offset_multiplier,
                u64::from(raw.b),
            )
        };
        DirEntry {
            index: idx,
            kind,
            name,
            offset,
            size,
            storage_cluster: raw.storage_cluster,
            flags: raw.flags,
        }
    }

    fn root_entry(&self) -> Result<DirEntry> {
        let raw = self.raw(0)?;
        Ok(self.to_dir_entry(0, &raw, Arc::from("")))
    }

    /// End of a directory's range; it must lie past the directory itself.
    fn dir_bound(&self, idx: u32, raw: &RawEntry) -> Result<u32> {
        if raw.b <= idx {
            return Err(self.corrupt("FST directory does not end after itself"));
        }
        Ok(raw.b)
    }

    /// Look up an absolute path. `""` and `"/"` name the root.
    ///
    /// Matching is case-sensitive. Repeated and trailing slashes are
    /// ignored. Returns [`Error::NotFound`] when no entry matches and
    /// [`Error::Corrupt`] when the table cannot be walked safely.
    pub fn find_path(&self, path: &str) -> Result<DirEntry> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        if components.peek().is_none() {
            return self.root_entry();
        }

        let mut idx = 1u32;
        let mut bound = self.file_count;
        while let Some(component) = components.next() {
            let (found, raw) = self.scan(component, idx, bound)?;
            let last = components.peek().is_none();
            if last {
                let name = self.name(&raw)?;
                return Ok(self.to_dir_entry(found, &raw, name));
            }
            if !raw.is_dir {
                return Err(Error::NotFound);
            }
            bound = self.dir_bound(found, &raw)?;
            idx = found + 1;
        }
        Err(Error::NotFound)
    }

    /// Find `name` among the children in `[idx, bound)`.
    fn scan(&self, name: &str, mut idx: u32, bound: u32) -> Result<(u32, RawEntry)> {
        while idx < bound {
            let raw = self.raw(idx)?;
            if *self.name(&raw)? == *name {
                return Ok((idx, raw));
            }
            idx = if raw.is_dir { self.dir_bound(idx, &raw)? } else { idx + 1 };
        }
        Err(Error::NotFound)
    }

    /// Open a directory for enumeration.
    pub fn opendir(&self, path: &str) -> Result<FstDir<'_>> {
        let dir = self.find_path(path)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        let raw = self.raw(dir.index)?;
        let bound = self.dir_bound(dir.index, &raw)?;
        self.open_dirs.fetch_add(1, Ordering::AcqRel);
        Ok(FstDir {
            fst: self,
            dir: dir.index,
            bound,
            cursor: dir.index,
            finished: false,
        })
    }

    /// Sum of every file's size, in one pass over the entry array.
    pub fn total_used_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for idx in 1..self.file_count {
            let raw = self.raw(idx)?;
            if !raw.is_dir {
                total += u64::from(raw.b);
            }
        }
        Ok(total)
    }
}

impl Drop for Fst {
    fn drop(&mut self) {
        debug_assert_eq!(self.open_dirs(), 0, "FST dropped with open directories");
    }
}

impl std::fmt::Debug for Fst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fst")
            .field("format", &self.format)
            .field("file_count", &self.file_count)
            .field("string_table_len", &self.string_table_len)
            .finish_non_exhaustive()
    }
}

fn read_entry(buf: &[u8], pos: usize, entry_size: usize) -> Result<RawEntry> {
    let type_name = be_u32(buf, pos)?;
    let (flags, storage_cluster) = if entry_size == WIIU_ENTRY_SIZE {
        (be_u16(buf, pos + 0x0C)?, be_u16(buf, pos + 0x0E)?)
    } else {
        (0, 0)
    };
    Ok(RawEntry {
        is_dir: type_name >> 24 == 1,
        name_offset: type_name & 0x00FF_FFFF,
        a: be_u32(buf, pos + 0x04)?,
        b: be_u32(buf, pos + 0x08)?,
        flags,
        storage_cluster,
    })
}

fn parse_secondary_header(buf: &[u8], pos: usize) -> Result<SecondaryHeader> {
    Ok(SecondaryHeader {
        offset: be_u32(buf, pos)?,
        size: be_u32(buf, pos + 0x04)?,
        owner_id: be_u64(buf, pos + 0x08)?,
        group_id: be_u32(buf, pos + 0x10)?,
    })
}

/// Cursor over one directory's direct children.
///
/// Borrows its [`Fst`], so the index outlives every cursor. Each step moves
/// strictly forward; a step that would not is reported as corruption and
/// ends the enumeration.
#[derive(Debug)]
pub struct FstDir<'a> {
    fst: &'a Fst,
    dir: u32,
    bound: u32,
    cursor: u32,
    finished: bool,
}

impl FstDir<'_> {
    /// Index of the directory being enumerated.
    pub fn index(&self) -> u32 {
        self.dir
    }

    /// Next child, or `Ok(None)` at the end of the directory.
    pub fn readdir(&mut self) -> Result<Option<DirEntry>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.advance();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<DirEntry>> {
        let current = self.fst.raw(self.cursor)?;
        let next = if self.cursor != self.dir && current.is_dir {
            self.fst.dir_bound(self.cursor, &current)?
        } else {
            self.cursor + 1
        };
        if next >= self.bound {
            return Ok(None);
        }

        let raw = self.fst.raw(next)?;
        let name = self.fst.name(&raw)?;
        if name.is_empty() {
            return Err(self.fst.corrupt("FST entry has an empty name"));
        }
        self.cursor = next;
        Ok(Some(self.fst.to_dir_entry(next, &raw, name)))
    }

    /// Close the cursor. Dropping it has the same effect.
    pub fn closedir(self) {}
}

impl Iterator for FstDir<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.readdir().transpose()
    }
}

impl Drop for FstDir<'_> {
    fn drop(&mut self) {
        self.fst.open_dirs.fetch_sub(1, Ordering::AcqRel);
    }
}
