//! The I/O backend contract and its file-based implementation.
//!
//! The storage engine is generic over `IoBackend` so the merge algorithm,
//! interpolation search, and sync protocol never touch `std::fs` directly.
//! `FileIo` is the only implementation shipped here; it is built the way
//! the teacher engine builds its position-tracked readers/writers, plus a
//! small fixed header carrying the generation counter and a serialized
//! fan-out blob.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const GENERATION_LEN: usize = 8;
const FANOUT_LEN_LEN: usize = 4;

/// Abstract append-only file with a small header carrying `generation` and
/// a serialized fan-out blob.
///
/// Out of scope per the design this crate follows: callers never implement
/// this themselves in practice (there is one backend, `FileIo`), but the
/// engine is written against the trait so the merge/search/sync code stays
/// decoupled from `std::fs`.
pub trait IoBackend: Sized {
    /// Opens (or creates) the file at `path`. `fresh` truncates any
    /// existing content; `readonly` never creates a missing file.
    fn open(path: &Path, fresh: bool, readonly: bool) -> Result<Self>;

    /// Whether a file already exists at `path`, without opening it.
    fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Creates a fresh file with a reserved header of `fanout_len` bytes
    /// (zero-filled) and the given `generation`, ready for a caller to
    /// stream entries into via `append`.
    fn create_reserved(path: &Path, generation: u64, fanout_len: usize) -> Result<Self>;

    /// Appends `bytes` to the payload region, returning the payload-relative
    /// offset they were written at.
    fn append(&mut self, bytes: &[u8]) -> Result<u64>;

    /// Reads `len` bytes at payload-relative `offset`.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Current length of the payload region in bytes.
    fn payload_len(&self) -> u64;

    /// Re-reads the payload length from disk. Used by read-only observers
    /// whose cached view of the file may be stale.
    fn refresh_payload_len(&mut self) -> Result<u64>;

    /// Re-reads just the generation field from disk, without touching the
    /// cached fan-out or payload length. Used by read-only observers to
    /// detect a merge before deciding whether a full resync is needed.
    fn refresh_generation(&mut self) -> Result<u64>;

    /// Flushes buffered writes and fsyncs the file.
    fn fsync(&mut self) -> Result<()>;

    /// Truncates the payload and rewrites a fresh header with
    /// `generation = 0` and an empty fan-out.
    fn clear(&mut self) -> Result<()>;

    /// Closes the underlying file handle.
    fn close(self) -> Result<()>;

    /// Generation recorded in this file's header.
    fn generation(&self) -> u64;

    /// Overwrites just the generation field of the header in place.
    fn set_generation(&mut self, generation: u64) -> Result<()>;

    /// The fan-out blob recorded in this file's header, if any.
    fn fanout_bytes(&self) -> &[u8];

    /// Writes `fanout` into the header's reserved fan-out region. `fanout`
    /// must be exactly the length reserved at `create_reserved` time.
    fn finalize_header(&mut self, generation: u64, fanout: &[u8]) -> Result<()>;

    /// Atomically renames `tmp` over `dest`.
    fn rename_over(tmp: &Path, dest: &Path) -> Result<()> {
        fs::rename(tmp, dest).map_err(Error::Io)
    }
}

/// `std::fs::File`-backed implementation of [`IoBackend`].
///
/// Header layout: `generation: u64 LE` followed by `fanout_len: u32 LE`
/// followed by `fanout_len` bytes of fan-out blob. The payload (log entries
/// or sorted index entries) begins immediately after.
pub struct FileIo {
    file: File,
    path: PathBuf,
    header_len: u64,
    generation: u64,
    fanout: Vec<u8>,
    payload_len: u64,
    readonly: bool,
}

impl FileIo {
    /// Reads the header, returning `(generation, fanout_bytes)`.
    fn read_header(file: &mut File) -> Result<(u64, Vec<u8>)> {
        file.seek(SeekFrom::Start(0))?;
        let mut gen_buf = [0u8; GENERATION_LEN];
        file.read_exact(&mut gen_buf)?;
        let generation = u64::from_le_bytes(gen_buf);

        let mut len_buf = [0u8; FANOUT_LEN_LEN];
        file.read_exact(&mut len_buf)?;
        let fanout_len = u32::from_le_bytes(len_buf) as usize;

        let mut fanout = vec![0u8; fanout_len];
        file.read_exact(&mut fanout)?;

        Ok((generation, fanout))
    }

    fn write_header_at_creation(file: &mut File, generation: u64, fanout: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&generation.to_le_bytes())?;
        file.write_all(&(fanout.len() as u32).to_le_bytes())?;
        file.write_all(fanout)?;
        file.flush()?;
        Ok(())
    }
}

impl IoBackend for FileIo {
    fn open(path: &Path, fresh: bool, readonly: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let existed = path.exists() && !fresh;

        let mut file = OpenOptions::new()
            .read(true)
            .write(!readonly)
            .create(!readonly)
            .truncate(fresh && !readonly)
            .open(path)?;

        let (generation, fanout, header_len) = if existed && file.metadata()?.len() > 0 {
            let (generation, fanout) = Self::read_header(&mut file)?;
            let header_len = (GENERATION_LEN + FANOUT_LEN_LEN + fanout.len()) as u64;
            (generation, fanout, header_len)
        } else {
            if !readonly {
                Self::write_header_at_creation(&mut file, 0, &[])?;
            }
            (0, Vec::new(), (GENERATION_LEN + FANOUT_LEN_LEN) as u64)
        };

        let total_len = file.metadata()?.len();
        let payload_len = total_len.saturating_sub(header_len);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header_len,
            generation,
            fanout,
            payload_len,
            readonly,
        })
    }

    fn create_reserved(path: &Path, generation: u64, fanout_len: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let reserved = vec![0u8; fanout_len];
        Self::write_header_at_creation(&mut file, generation, &reserved)?;
        let header_len = (GENERATION_LEN + FANOUT_LEN_LEN + fanout_len) as u64;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header_len,
            generation,
            fanout: reserved,
            payload_len: 0,
            readonly: false,
        })
    }

    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        if self.readonly {
            return Err(Error::ReadOnly);
        }
        let offset = self.payload_len;
        self.file.seek(SeekFrom::Start(self.header_len + offset))?;
        self.file.write_all(bytes)?;
        self.payload_len += bytes.len() as u64;
        Ok(offset)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(self.header_len + offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn payload_len(&self) -> u64 {
        self.payload_len
    }

    fn refresh_payload_len(&mut self) -> Result<u64> {
        let total_len = self.file.metadata()?.len();
        self.payload_len = total_len.saturating_sub(self.header_len);
        Ok(self.payload_len)
    }

    fn refresh_generation(&mut self) -> Result<u64> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut gen_buf = [0u8; GENERATION_LEN];
        self.file.read_exact(&mut gen_buf)?;
        self.generation = u64::from_le_bytes(gen_buf);
        Ok(self.generation)
    }

    fn fsync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.generation = 0;
        self.fanout.clear();
        self.header_len = (GENERATION_LEN + FANOUT_LEN_LEN) as u64;
        self.payload_len = 0;
        Self::write_header_at_creation(&mut self.file, 0, &[])?;
        Ok(())
    }

    fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn set_generation(&mut self, generation: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&generation.to_le_bytes())?;
        self.file.flush()?;
        self.generation = generation;
        Ok(())
    }

    fn fanout_bytes(&self) -> &[u8] {
        &self.fanout
    }

    fn finalize_header(&mut self, generation: u64, fanout: &[u8]) -> Result<()> {
        if fanout.len() != self.fanout.len() {
            return Err(Error::Corrupt(format!(
                "fan-out size changed between reservation ({}) and finalize ({})",
                self.fanout.len(),
                fanout.len()
            )));
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&generation.to_le_bytes())?;
        self.file.write_all(&(fanout.len() as u32).to_le_bytes())?;
        self.file.write_all(fanout)?;
        self.file.flush()?;
        self.generation = generation;
        self.fanout = fanout.to_vec();
        Ok(())
    }
}

/// Returns the log file path under `root`.
pub fn log_path(root: &Path) -> PathBuf {
    root.join("index").join("log")
}

/// Returns the sorted index file path under `root`.
pub fn data_path(root: &Path) -> PathBuf {
    root.join("index").join("data")
}

/// Returns the temporary merge-target path under `root`.
pub fn merge_path(root: &Path) -> PathBuf {
    root.join("index").join("merge")
}

/// Returns the advisory lock path under `root`.
pub fn lock_path(root: &Path) -> PathBuf {
    root.join("index").join("lock")
}

/// Returns the `root/index` directory path.
pub fn index_dir(root: &Path) -> PathBuf {
    root.join("index")
}
