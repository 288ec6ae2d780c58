//! # WAL - Segmented Write-Ahead Log
//!
//! Provides durability for the StrataKV storage engine.
//!
//! Every mutation (`put` or `delete`) is encoded as an [`Entry`] and appended
//! to the WAL **before** the corresponding memtable update.
//!
//! ## Segments
//!
//! ```text
//! <dir>/wal_00000.log
//! <dir>/wal_00001.log
//! <dir>/wal_00002.log   <- newest: receives appends, replayed on startup
//! ```
//!
//! Each segment is a plain concatenation of entries. `current_offset` is the
//! number of segments; appends go to segment `current_offset - 1`.
//!
//! - [`Wal::rotate`] starts a fresh segment. The engine calls it right after a
//!   memtable flush, so every older segment is already covered by a table.
//! - When the segment count exceeds the water mark, every segment but the
//!   newest is deleted and the newest is renamed to `wal_00000.log`.
//! - On startup only the newest segment is replayed
//!   ([`Wal::replay_latest`]); older ones are assumed flushed.
//!
//! A second, batched write mode ([`Wal::add_entry_to_buffer`]) collects
//! entries in memory and writes each full batch as a new segment.
//!
//! ## Example
//!
//! ```rust,no_run
//! use record::{Entry, Record};
//! use wal::Wal;
//!
//! let mut wal = Wal::open("data/wal", 20, 10, true).unwrap();
//! wal.write_entry(&Entry::new("hello", Record::live(b"world".to_vec(), 1))).unwrap();
//! wal.replay_latest(|e| println!("{:?}", e)).unwrap();
//! ```
use record::{Entry, EntryError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An entry could not be decoded.
    #[error("entry error: {0}")]
    Entry(#[from] EntryError),
}

/// Sequential reader over one segment's entries.
///
/// Generic over any `Read` implementor so tests can feed in-memory buffers.
///
/// # Termination
///
/// - **Clean EOF** -> stop.
/// - **Truncated tail** (crash mid-append) -> stop after yielding every
///   complete entry before it.
/// - **Checksum mismatch** -> the entry is skipped, reading continues.
/// - **Structurally corrupt entry** (impossible lengths) -> stop; the rest of
///   the segment cannot be framed.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing segment for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader::from_reader(f))
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Calls `apply` for every valid entry, returning how many were skipped.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<usize, WalError>
    where
        F: FnMut(Entry),
    {
        let mut skipped = 0;
        loop {
            match Entry::read_from(&mut self.rdr) {
                Ok(Some(entry)) => apply(entry),
                Ok(None) => return Ok(skipped),
                Err(EntryError::Truncated) => {
                    debug!("truncated WAL tail ignored");
                    return Ok(skipped);
                }
                Err(EntryError::ChecksumMismatch { expected, actual }) => {
                    warn!(expected, actual, "skipping WAL entry with bad checksum");
                    skipped += 1;
                }
                Err(EntryError::Corrupt(reason)) => {
                    warn!(%reason, "stopping WAL replay at corrupt entry");
                    return Ok(skipped);
                }
                Err(EntryError::Io(e)) => return Err(WalError::Io(e)),
            }
        }
    }
}

/// The segmented write-ahead log.
pub struct Wal {
    dir: PathBuf,
    /// Number of segments; the active one is `current_offset - 1`.
    current_offset: usize,
    water_mark: usize,
    sync: bool,
    buffer: Vec<u8>,
    buffer_size: usize,
    buffer_capacity: usize,
}

impl Wal {
    /// Opens the WAL directory, creating it if needed.
    ///
    /// Existing segments `wal_00000.log, wal_00001.log, ...` are counted so the
    /// offset continues after the last one.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        water_mark: usize,
        buffer_capacity: usize,
        sync: bool,
    ) -> Result<Self, WalError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut current_offset = 0;
        while segment_path(&dir, current_offset).exists() {
            current_offset += 1;
        }
        debug!(dir = %dir.display(), segments = current_offset, "opened WAL");

        Ok(Self {
            dir,
            current_offset,
            water_mark,
            sync,
            buffer: Vec::new(),
            buffer_size: 0,
            buffer_capacity: buffer_capacity.max(1),
        })
    }

    /// Number of segments on disk (the active segment is the last one).
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.current_offset
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of segment `offset`.
    #[must_use]
    pub fn segment_path(&self, offset: usize) -> PathBuf {
        segment_path(&self.dir, offset)
    }

    /// Appends one entry to the active segment.
    ///
    /// The segment is opened in append mode, written with a single
    /// `write_all`, optionally fsynced, and closed again.
    pub fn write_entry(&mut self, entry: &Entry) -> Result<(), WalError> {
        if self.current_offset == 0 {
            self.rotate()?;
        }
        let path = self.segment_path(self.current_offset - 1);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        entry.write_to(&mut file)?;
        file.flush()?;
        if self.sync {
            file.sync_all()?;
        }

        self.truncate_if_needed()
    }

    /// Starts a new, empty segment; later appends go there.
    pub fn rotate(&mut self) -> Result<(), WalError> {
        let path = self.segment_path(self.current_offset);
        File::create(&path)?;
        self.current_offset += 1;
        debug!(segment = %path.display(), "rotated WAL");
        Ok(())
    }

    /// Buffers an entry; a full buffer is written out as a new segment.
    ///
    /// Returns `true` when this call wrote a segment.
    pub fn add_entry_to_buffer(&mut self, entry: &Entry) -> Result<bool, WalError> {
        entry.write_to(&mut self.buffer)?;
        self.buffer_size += 1;
        if self.buffer_size < self.buffer_capacity {
            return Ok(false);
        }
        self.write_buffer()?;
        self.truncate_if_needed()?;
        Ok(true)
    }

    /// Writes every buffered entry into a brand-new segment.
    pub fn write_buffer(&mut self) -> Result<(), WalError> {
        let path = self.segment_path(self.current_offset);
        let mut file = File::create(&path)?;
        file.write_all(&self.buffer)?;
        if self.sync {
            file.sync_all()?;
        }
        self.current_offset += 1;
        debug!(segment = %path.display(), entries = self.buffer_size, "wrote WAL batch");
        self.buffer.clear();
        self.buffer_size = 0;
        Ok(())
    }

    /// Entries waiting in the batch buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer_size
    }

    /// Feeds every entry of the newest segment to `apply`.
    ///
    /// Returns the number of entries applied. A missing segment (fresh
    /// directory) replays nothing.
    pub fn replay_latest<F>(&self, mut apply: F) -> Result<usize, WalError>
    where
        F: FnMut(Entry),
    {
        if self.current_offset == 0 {
            return Ok(0);
        }
        let path = self.segment_path(self.current_offset - 1);
        let mut applied = 0;
        let skipped = WalReader::open(&path)?.replay(|e| {
            applied += 1;
            apply(e);
        })?;
        info!(segment = %path.display(), applied, skipped, "replayed WAL segment");
        Ok(applied)
    }

    /// Reads every segment, oldest first.
    pub fn read_all(&self) -> Result<Vec<Entry>, WalError> {
        let mut out = Vec::new();
        for offset in 0..self.current_offset {
            WalReader::open(self.segment_path(offset))?.replay(|e| out.push(e))?;
        }
        Ok(out)
    }

    // ---- Internal helpers ----

    /// Deletes all but the newest segment once the water mark is exceeded,
    /// then renames the newest to segment 0.
    fn truncate_if_needed(&mut self) -> Result<(), WalError> {
        if self.current_offset <= self.water_mark {
            return Ok(());
        }
        let newest = self.current_offset - 1;
        for offset in 0..newest {
            fs::remove_file(self.segment_path(offset))?;
        }
        fs::rename(self.segment_path(newest), self.segment_path(0))?;
        self.current_offset = 1;
        info!(removed = newest, "truncated WAL to newest segment");
        Ok(())
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("dir", &self.dir)
            .field("current_offset", &self.current_offset)
            .field("water_mark", &self.water_mark)
            .field("buffered", &self.buffer_size)
            .finish()
    }
}

fn segment_path(dir: &Path, offset: usize) -> PathBuf {
    dir.join(format!("wal_{offset:05}.log"))
}
