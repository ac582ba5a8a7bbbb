//! Append-only data file.
//!
//! The data file is a fixed header followed by tagged records. Records are
//! only ever appended; the bytes below the published end-of-file never
//! change once written.
//!
//! # Header
//!
//! ```text
//! +-------+-------------------------------------+
//! | 0-7   | magic "SPINEDB\0"                   |
//! | 8-11  | format version (u32, big-endian)    |
//! | 12-15 | reserved, zero                      |
//! +-------+-------------------------------------+
//! ```
//!
//! # Concurrency
//!
//! Appends are serialised by the write lock, a `Mutex` around the
//! end-of-file position. The lock is held for the whole reserve-and-write so
//! two writers can never be handed overlapping regions. Reads go through
//! positional I/O on the shared handle and never take the lock; they are
//! bounded by the published length, which only moves forward after the bytes
//! beneath it are completely written.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::storage::data::Data;
use crate::storage::rope::Rope;

/// A byte offset into the data file.
pub type Offset = u64;

/// Magic number identifying a spinedb data file.
pub const MAGIC: [u8; 8] = *b"SPINEDB\0";

/// Current file format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes. The first record starts here.
pub const HEADER_SIZE: u64 = HEADER_LEN as u64;

const HEADER_LEN: usize = 16;

/// An append-only file of tagged records.
pub struct DataFile {
    file: File,
    path: PathBuf,
    /// Write lock. Guards the end-of-file position used by `append`.
    end: Mutex<u64>,
    /// Length visible to readers. Never exceeds `end`.
    published: AtomicU64,
    /// Fault injection: when non-zero, each `sync` counts it down and the
    /// call that reaches zero fails.
    #[cfg(test)]
    sync_countdown: AtomicU64,
}

impl DataFile {
    /// Create a new data file containing only the header.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, FileError> {
        if path.exists() {
            return Err(FileError::AlreadyExists(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(FileError::Io)?;

        file.write_all(&header_bytes()).map_err(FileError::Io)?;
        file.sync_all().map_err(FileError::Io)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            end: Mutex::new(HEADER_SIZE),
            published: AtomicU64::new(HEADER_SIZE),
            #[cfg(test)]
            sync_countdown: AtomicU64::new(0),
        })
    }

    /// Open an existing data file and validate its header.
    ///
    /// The whole file is published; recovery decides whether a torn tail must
    /// be cut off with [`DataFile::truncate`].
    pub fn open(path: &Path) -> Result<Self, FileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(FileError::Io)?;

        let len = file.metadata().map_err(FileError::Io)?.len();
        if len < HEADER_SIZE {
            return Err(FileError::TooShort(len));
        }

        let mut header = [0u8; HEADER_LEN];
        read_exact_at(&file, &mut header, 0).map_err(FileError::Io)?;

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&header[0..8]);
        if magic != MAGIC {
            return Err(FileError::InvalidMagic(magic));
        }

        let format_version = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        if format_version != FORMAT_VERSION {
            return Err(FileError::UnsupportedFormat(format_version));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            end: Mutex::new(len),
            published: AtomicU64::new(len),
            #[cfg(test)]
            sync_countdown: AtomicU64::new(0),
        })
    }

    /// Path this file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes visible to readers.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Whether the file holds no records beyond the header.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= HEADER_SIZE
    }

    /// Append a record at the end of the file and return its offset.
    ///
    /// The write lock is held while the rope is streamed out, so the
    /// returned region belongs to this call alone. On failure nothing is
    /// published and the next append reuses the same region.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn append(&self, rope: &Rope) -> Result<Offset, FileError> {
        let mut end = self.end.lock().expect("lock poisoned");
        let offset = *end;

        let mut writer = BufWriter::new(PositionedWriter {
            file: &self.file,
            position: offset,
        });
        rope.write_to(&mut writer).map_err(FileError::Io)?;
        writer.flush().map_err(FileError::Io)?;

        *end = offset + rope.len() as u64;
        self.published.store(*end, Ordering::Release);
        drop(end);

        Ok(offset)
    }

    /// Flush written bytes to durable storage.
    pub fn sync(&self) -> Result<(), FileError> {
        #[cfg(test)]
        if self.sync_countdown.load(Ordering::Acquire) != 0
            && self.sync_countdown.fetch_sub(1, Ordering::AcqRel) == 1
        {
            return Err(FileError::Io(io::Error::other("injected sync failure")));
        }
        self.file.sync_data().map_err(FileError::Io)
    }

    /// Let the next `successes` calls to `sync` through, then fail one.
    #[cfg(test)]
    pub(crate) fn fail_sync_after(&self, successes: u64) {
        self.sync_countdown.store(successes + 1, Ordering::Release);
    }

    /// Read exactly `len` bytes at `offset`.
    pub fn read(&self, offset: Offset, len: usize) -> Result<Vec<u8>, FileError> {
        self.check_bounds(offset, len as u64)?;
        let mut buf = vec![0u8; len];
        read_exact_at(&self.file, &mut buf, offset).map_err(FileError::Io)?;
        Ok(buf)
    }

    /// Read one byte.
    pub fn read_u8(&self, offset: Offset) -> Result<u8, FileError> {
        let mut buf = [0u8; 1];
        self.read_into(offset, &mut buf)?;
        Ok(buf[0])
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&self, offset: Offset) -> Result<u32, FileError> {
        let mut buf = [0u8; 4];
        self.read_into(offset, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a big-endian `u64`.
    pub fn read_u64(&self, offset: Offset) -> Result<u64, FileError> {
        let mut buf = [0u8; 8];
        self.read_into(offset, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Read a `u32` length prefix followed by that many bytes.
    pub fn read_data(&self, offset: Offset) -> Result<Data, FileError> {
        let len = self.read_u32(offset)?;
        let Ok(len) = usize::try_from(len) else {
            return Err(FileError::OutOfBounds {
                offset: offset + 4,
                len: u64::from(len),
                end: self.len(),
            });
        };
        let bytes = self.read(offset + 4, len)?;
        Ok(Data::from(bytes))
    }

    /// Cut the file back to `len` bytes.
    ///
    /// Only used by recovery, before the file is shared, to drop a record
    /// that a crash left half-written.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub(crate) fn truncate(&self, len: u64) -> Result<(), FileError> {
        let mut end = self.end.lock().expect("lock poisoned");
        if len < HEADER_SIZE || len > *end {
            return Err(FileError::OutOfBounds {
                offset: len,
                len: 0,
                end: *end,
            });
        }
        self.file.set_len(len).map_err(FileError::Io)?;
        self.file.sync_all().map_err(FileError::Io)?;
        *end = len;
        self.published.store(len, Ordering::Release);
        Ok(())
    }

    fn read_into(&self, offset: Offset, buf: &mut [u8]) -> Result<(), FileError> {
        self.check_bounds(offset, buf.len() as u64)?;
        read_exact_at(&self.file, buf, offset).map_err(FileError::Io)
    }

    fn check_bounds(&self, offset: Offset, len: u64) -> Result<(), FileError> {
        let end = self.len();
        match offset.checked_add(len) {
            Some(stop) if stop <= end => Ok(()),
            _ => Err(FileError::OutOfBounds { offset, len, end }),
        }
    }
}

fn header_bytes() -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..8].copy_from_slice(&MAGIC);
    header[8..12].copy_from_slice(&FORMAT_VERSION.to_be_bytes());
    header
}

/// `io::Write` adapter that writes at an explicit file position.
struct PositionedWriter<'a> {
    file: &'a File,
    position: u64,
}

impl Write for PositionedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        write_all_at(self.file, buf, self.position)?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Errors that can occur during data file operations.
#[derive(Debug)]
pub enum FileError {
    /// I/O error from the underlying medium.
    Io(io::Error),
    /// File already exists (when creating).
    AlreadyExists(PathBuf),
    /// File is shorter than the header.
    TooShort(u64),
    /// Header does not start with the spinedb magic.
    InvalidMagic([u8; 8]),
    /// Header names a format this build cannot read.
    UnsupportedFormat(u32),
    /// A read would run past the published end of the file.
    OutOfBounds { offset: u64, len: u64, end: u64 },
}

impl FileError {
    /// Whether this error means the file contents are damaged, as opposed to
    /// the medium failing.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::TooShort(_)
                | Self::InvalidMagic(_)
                | Self::UnsupportedFormat(_)
                | Self::OutOfBounds { .. }
        )
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(path) => write!(f, "file already exists: {}", path.display()),
            Self::TooShort(len) => write!(f, "file too short for header: {len} bytes"),
            Self::InvalidMagic(magic) => write!(f, "invalid magic number: {magic:?}"),
            Self::UnsupportedFormat(v) => write!(f, "unsupported format version: {v}"),
            Self::OutOfBounds { offset, len, end } => write!(
                f,
                "read of {len} bytes at offset {offset} runs past end of file ({end})"
            ),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FileError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
