//! Shared, reference-counted random-access file handle.
//!
//! A [`SharedFile`] is handed to every parser instance and sub-structure
//! reader that needs the file. Cloning it bumps an atomic reference count;
//! the underlying source is closed when the last clone is dropped.
//!
//! Each `seek` + `read` pair made through [`SharedFile::read_at`] holds the
//! source lock for its whole duration, so holders on different threads never
//! observe each other's file position.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::{Error, Result};

/// Any seekable byte source a [`SharedFile`] can wrap.
pub trait RandomAccess: Read + Seek + Send {}

impl<T: Read + Seek + Send> RandomAccess for T {}

struct Inner {
    source: Mutex<Box<dyn RandomAccess>>,
    size: u64,
    filename: Option<String>,
}

/// Cloneable handle to an open file.
#[derive(Clone)]
pub struct SharedFile {
    inner: Arc<Inner>,
}

impl SharedFile {
    /// Open a file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Self::from_reader(file, name.as_deref())
    }

    /// Wrap an arbitrary reader, e.g. a [`std::io::Cursor`] over a buffer.
    ///
    /// The size is taken once by seeking to the end and never changes for the
    /// lifetime of the handle.
    pub fn from_reader<R: RandomAccess + 'static>(mut reader: R, filename: Option<&str>) -> Result<Self> {
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        trace!(size, filename, "opened shared file");
        Ok(Self {
            inner: Arc::new(Inner {
                source: Mutex::new(Box::new(reader)),
                size,
                filename: filename.map(str::to_owned),
            }),
        })
    }

    /// Total size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// File name (no directory components), if known.
    pub fn filename(&self) -> Option<&str> {
        self.inner.filename.as_deref()
    }

    /// Extension of [`filename`](Self::filename) including the leading dot,
    /// e.g. `".tik"`. Case is preserved.
    pub fn extension(&self) -> Option<&str> {
        let name = self.filename()?;
        let dot = name.rfind('.')?;
        (dot > 0 && dot + 1 < name.len()).then(|| &name[dot..])
    }

    /// Number of live handles sharing this file.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Move the file position.
    pub fn seek(&self, offset: u64) -> Result<()> {
        self.inner.source.lock().seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read at the current position, returning the number of bytes read.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.inner.source.lock().read(buf)?)
    }

    /// Seek and read as one step. May return fewer bytes than requested at
    /// end of file.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut source = self.inner.source.lock();
        source.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Seek and fill `buf` completely, or fail with
    /// [`Error::UnexpectedEof`]. Short reads are never padded.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if self.read_at(offset, buf)? != buf.len() {
            return Err(Error::UnexpectedEof);
        }
        Ok(())
    }

    /// Read `len` bytes at `offset` into a new buffer.
    ///
    /// `len` is checked against the file size before anything is allocated.
    pub fn read_vec_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64).ok_or(Error::InvalidRange)?;
        if end > self.size() {
            return Err(Error::InvalidRange);
        }
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Bounded reader over `len` bytes starting at `offset`.
    pub fn region(&self, offset: u64, len: u64) -> Region {
        Region {
            file: self.clone(),
            pos: offset,
            end: offset.saturating_add(len).min(self.size()),
        }
    }
}

impl std::fmt::Debug for SharedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFile")
            .field("filename", &self.inner.filename)
            .field("size", &self.inner.size)
            .finish()
    }
}

/// A [`Read`] view over a byte range of a [`SharedFile`].
///
/// Keeps its own position, so several regions over the same file can be
/// read in any interleaving.
pub struct Region {
    file: SharedFile,
    pos: u64,
    end: u64,
}

impl Read for Region {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(0);
        }
        let n = self
            .file
            .read_at(self.pos, &mut buf[..want])
            .map_err(|e| match e {
                Error::Io(e) => e,
                other => io::Error::other(other),
            })?;
        self.pos += n as u64;
        Ok(n)
    }
}
