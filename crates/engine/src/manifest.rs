//! # Level State - persistent per-level table counts
//!
//! Records how many tables each level holds so the level manager can reopen
//! them by `(level, index)` after a restart.
//!
//! ## File Format (`lsm.bin`, big-endian)
//!
//! ```text
//! [max_level: u32][current_level: u32][size of level 1: u32] ... [size of level max_level: u32]
//! ```
//!
//! ## Crash Safety
//!
//! The file is rewritten atomically: write `lsm.bin.tmp`, fsync, then rename
//! over `lsm.bin`. A reader never sees a partially written state.
use anyhow::{ensure, Context, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the state file inside the table root.
pub const STATE_FILENAME: &str = "lsm.bin";

const STATE_TMP_FILENAME: &str = "lsm.bin.tmp";

/// In-memory copy of `lsm.bin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelState {
    path: PathBuf,
    pub max_level: u32,
    /// Deepest level holding at least one table (1 when every level is empty).
    pub current_level: u32,
    /// `level_sizes[i]` is the table count of level `i + 1`.
    pub level_sizes: Vec<u32>,
}

impl LevelState {
    /// Loads `root/lsm.bin`, or creates it with `max_level` empty levels.
    ///
    /// A stored state with fewer levels than `max_level` is extended with
    /// empty ones; it is never shrunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn load_or_create(root: &Path, max_level: u32) -> Result<Self> {
        let path = root.join(STATE_FILENAME);

        if !path.exists() {
            let state = Self {
                path,
                max_level,
                current_level: 1,
                level_sizes: vec![0; max_level as usize],
            };
            state.save()?;
            return Ok(state);
        }

        let bytes =
            fs::read(&path).with_context(|| format!("failed to read level state at {}", path.display()))?;
        let mut state = Self::decode(path.clone(), &bytes)
            .with_context(|| format!("corrupt level state at {}", path.display()))?;

        if max_level > state.max_level {
            state.max_level = max_level;
            state.level_sizes.resize(max_level as usize, 0);
            state.save()?;
        }
        Ok(state)
    }

    fn decode(path: PathBuf, mut buf: &[u8]) -> Result<Self> {
        ensure!(buf.len() >= 8, "state file is {} bytes, expected at least 8", buf.len());
        let max_level = buf.read_u32::<BigEndian>()?;
        let current_level = buf.read_u32::<BigEndian>()?;
        ensure!(
            buf.len() == max_level as usize * 4,
            "expected {} level sizes, found {} trailing bytes",
            max_level,
            buf.len()
        );
        let mut level_sizes = Vec::with_capacity(max_level as usize);
        for _ in 0..max_level {
            level_sizes.push(buf.read_u32::<BigEndian>()?);
        }
        Ok(Self {
            path,
            max_level,
            current_level,
            level_sizes,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.level_sizes.len() * 4);
        buf.extend_from_slice(&self.max_level.to_be_bytes());
        buf.extend_from_slice(&self.current_level.to_be_bytes());
        for size in &self.level_sizes {
            buf.extend_from_slice(&size.to_be_bytes());
        }
        buf
    }

    /// Persists the state through a temp file and rename.
    pub fn save(&self) -> Result<()> {
        let tmp_path = self.path.with_file_name(STATE_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to create level state tmp at {}", tmp_path.display()))?;
            f.write_all(&self.encode())?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to replace level state at {}", self.path.display()))?;
        Ok(())
    }

    /// Table count of `level` (1-based).
    #[must_use]
    pub fn size(&self, level: u32) -> u32 {
        self.level_sizes[level as usize - 1]
    }

    /// Sets the table count of `level` and recomputes `current_level`.
    pub fn set_size(&mut self, level: u32, size: u32) {
        self.level_sizes[level as usize - 1] = size;
        self.current_level = self
            .level_sizes
            .iter()
            .rposition(|&n| n > 0)
            .map_or(1, |i| i as u32 + 1);
    }
}
