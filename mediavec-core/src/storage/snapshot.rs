//! Checksummed binary snapshot of one namespace generation.
//!
//! A namespace directory holds a single `index.mvx`. It is replaced
//! atomically: the new payload is written to a temp file in the same
//! directory, fsynced, renamed over the old file, and the directory is
//! fsynced. A crash at any point leaves either the old or the new file.
//!
//! # Format
//!
//! All integers little-endian:
//! ```text
//! [magic:"MVIX"][version:u16][metric:u8][dimension:u32]
//! [identity_len:u32][identity:utf8][generation:u64][count:u64]
//! count x [path_len:u32][path:utf8][mtime_secs:i64][mtime_nanos:u32][f32; dimension]
//! [crc32:u32]   over every preceding byte
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::{Generation, IndexEntry};
use crate::media::Mtime;

/// File name of the committed snapshot inside a namespace directory.
pub const SNAPSHOT_FILE: &str = "index.mvx";

const MAGIC: &[u8; 4] = b"MVIX";
const FORMAT_VERSION: u16 = 1;
const TEMP_PREFIX: &str = "index.mvx.tmp-";

/// Smallest possible encoded record: empty path, mtime, zero floats.
const MIN_RECORD_LEN: usize = 4 + 8 + 4;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A decoded snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub metric: DistanceMetric,
    /// `None` for a snapshot of an empty, unpinned namespace.
    pub dimension: Option<usize>,
    pub identity: String,
    pub generation: u64,
    pub entries: Vec<IndexEntry>,
}

/// Path of the committed snapshot in `dir`.
pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// A fully written, fsynced temp file waiting to be renamed into place.
///
/// Dropping it without [`commit`](Self::commit) removes the temp file.
#[derive(Debug)]
pub struct StagedSnapshot {
    temp_path: PathBuf,
    target: PathBuf,
    generation: u64,
    committed: bool,
}

impl StagedSnapshot {
    /// Generation number contained in the staged file.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Renames the staged file over the committed snapshot.
    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.temp_path, &self.target)
            .map_err(|e| Error::IoError(format!("failed to commit snapshot: {}", e)))?;
        self.committed = true;

        if let Some(dir) = self.target.parent() {
            sync_dir(dir)?;
        }
        Ok(self.target.clone())
    }
}

impl Drop for StagedSnapshot {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Writes `generation` to a temp file in `dir` and fsyncs it.
pub fn stage(dir: &Path, identity: &str, generation: &Generation) -> Result<StagedSnapshot> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::IoError(format!("failed to create {}: {}", dir.display(), e)))?;

    let temp_path = dir.join(format!(
        "{}{}-{}",
        TEMP_PREFIX,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let staged = StagedSnapshot {
        temp_path,
        target: snapshot_path(dir),
        generation: generation.number(),
        committed: false,
    };

    let file = File::create(&staged.temp_path)
        .map_err(|e| Error::IoError(format!("failed to create snapshot: {}", e)))?;
    let mut writer = ChecksumWriter::new(BufWriter::new(file));
    encode(&mut writer, identity, generation)
        .map_err(|e| Error::IoError(format!("failed to write snapshot: {}", e)))?;

    let checksum = writer.checksum();
    let mut inner = writer.into_inner();
    inner
        .write_all(&checksum.to_le_bytes())
        .and_then(|_| inner.flush())
        .map_err(|e| Error::IoError(format!("failed to write snapshot: {}", e)))?;
    let file = inner
        .into_inner()
        .map_err(|e| Error::IoError(format!("failed to flush snapshot: {}", e.error())))?;
    file.sync_all()
        .map_err(|e| Error::IoError(format!("failed to sync snapshot: {}", e)))?;

    Ok(staged)
}

fn encode<W: Write>(w: &mut W, identity: &str, generation: &Generation) -> std::io::Result<()> {
    let dimension = generation.dimension().unwrap_or(0);

    w.write_all(MAGIC)?;
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;
    w.write_all(&[generation.metric().to_tag()])?;
    w.write_all(&(dimension as u32).to_le_bytes())?;
    w.write_all(&(identity.len() as u32).to_le_bytes())?;
    w.write_all(identity.as_bytes())?;
    w.write_all(&generation.number().to_le_bytes())?;
    w.write_all(&(generation.len() as u64).to_le_bytes())?;

    for entry in generation.index().iter() {
        // Scanner only admits UTF-8 paths.
        let path = entry.path.to_string_lossy();
        w.write_all(&(path.len() as u32).to_le_bytes())?;
        w.write_all(path.as_bytes())?;
        w.write_all(&entry.indexed_mtime.secs.to_le_bytes())?;
        w.write_all(&entry.indexed_mtime.nanos.to_le_bytes())?;
        for x in entry.vector.as_slice() {
            w.write_all(&x.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Reads the committed snapshot in `dir`, if there is one.
///
/// # Errors
///
/// Returns [`Error::StorageCorruption`] if the file is truncated, fails its
/// checksum, or was written for a different provider identity.
pub fn read(dir: &Path, expected_identity: &str) -> Result<Option<Snapshot>> {
    let path = snapshot_path(dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::IoError(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let snapshot = decode(&bytes)?;
    if snapshot.identity != expected_identity {
        return Err(Error::StorageCorruption(format!(
            "snapshot belongs to provider {:?}, expected {:?}",
            snapshot.identity, expected_identity
        )));
    }
    Ok(Some(snapshot))
}

/// Decodes and validates a complete snapshot payload.
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.len() < MAGIC.len() + 4 {
        return Err(corrupt("file too short"));
    }
    let (body, stored) = bytes.split_at(bytes.len() - 4);
    let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    if crc32fast::hash(body) != stored {
        return Err(corrupt("checksum mismatch"));
    }

    let mut r = Decoder::new(body);
    if r.take(MAGIC.len())? != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = r.u16()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(&format!("unsupported format version {}", version)));
    }
    let tag = r.u8()?;
    let metric = DistanceMetric::from_tag(tag)
        .ok_or_else(|| corrupt(&format!("unknown metric tag {}", tag)))?;
    let dimension = r.u32()? as usize;
    let identity = r.string()?;
    let generation = r.u64()?;
    let count = r.u64()?;

    if count > 0 && dimension == 0 {
        return Err(corrupt("entries present with zero dimension"));
    }
    let record_len = MIN_RECORD_LEN + dimension * 4;
    if count > (r.remaining() / record_len) as u64 {
        return Err(corrupt(&format!("record count {} exceeds payload", count)));
    }

    let mut entries = Vec::with_capacity(count as usize);
    let mut seen = HashSet::with_capacity(count as usize);
    for _ in 0..count {
        let path = PathBuf::from(r.string()?);
        let secs = r.i64()?;
        let nanos = r.u32()?;
        if nanos >= 1_000_000_000 {
            return Err(corrupt("invalid mtime"));
        }
        let mut vector = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            let x = r.f32()?;
            if !x.is_finite() {
                return Err(corrupt("non-finite vector component"));
            }
            vector.push(x);
        }
        if !seen.insert(path.clone()) {
            return Err(corrupt(&format!("duplicate entry {}", path.display())));
        }
        entries.push(IndexEntry::new(path, vector, Mtime::new(secs, nanos)));
    }
    if r.remaining() != 0 {
        return Err(corrupt("trailing bytes after records"));
    }

    Ok(Snapshot {
        metric,
        dimension: (dimension > 0).then_some(dimension),
        identity,
        generation,
        entries,
    })
}

/// Minimum age of another process's temp file before it counts as abandoned.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(15 * 60);

/// Removes temp files left behind by an interrupted persist.
///
/// Only files written by another process and untouched for at least
/// `min_age` are removed; a temp file of this process, or a recent one, may
/// belong to a persist still in flight on another handle.
pub fn remove_stale_temp_files(dir: &Path, min_age: Duration) -> usize {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return 0;
    };
    let own_pid = std::process::id();
    read_dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            match temp_file_pid(&name.to_string_lossy()) {
                Some(pid) => pid != own_pid,
                None => false,
            }
        })
        .filter(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .is_some_and(|age| age >= min_age)
        })
        .filter(|entry| fs::remove_file(entry.path()).is_ok())
        .count()
}

/// Writer pid encoded in a temp file name `index.mvx.tmp-<pid>-<counter>`.
fn temp_file_pid(name: &str) -> Option<u32> {
    let rest = name.strip_prefix(TEMP_PREFIX)?;
    let (pid, counter) = rest.split_once('-')?;
    counter.parse::<u64>().ok()?;
    pid.parse().ok()
}

fn corrupt(msg: &str) -> Error {
    Error::StorageCorruption(msg.to_string())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| Error::IoError(format!("failed to sync {}: {}", dir.display(), e)))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Feeds every written byte into a CRC32.
struct ChecksumWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Bounds-checked little-endian reader.
struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(corrupt("unexpected end of file"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn i64(&mut self) -> Result<i64> {
        self.array().map(i64::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32> {
        self.array().map(f32::from_le_bytes)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| corrupt("invalid utf-8 string"))
    }
}
