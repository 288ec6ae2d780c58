//! Where each zone of a table lives on disk.
//!
//! ```text
//! SingleFile                         MultiFile
//! sstable<I>/                        sstable<I>/
//!   sstable.bin                        data.bin
//!     [header 24B]                     index.bin
//!     [data][index][summary][filter]   summary.bin
//!   metadata.txt                       filter.bin
//!                                      metadata.txt
//! ```
//!
//! Readers only ever see a [`Zone`]: a file, a start offset and a length.
use anyhow::{ensure, Context, Result};
use config::TableLayout;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom, Take, Write};
use std::path::{Path, PathBuf};

use crate::format::{ZoneHeader, HEADER_BYTES};

pub const SINGLE_FILE: &str = "sstable.bin";
pub const DATA_FILE: &str = "data.bin";
pub const INDEX_FILE: &str = "index.bin";
pub const SUMMARY_FILE: &str = "summary.bin";
pub const FILTER_FILE: &str = "filter.bin";
pub const METADATA_FILE: &str = "metadata.txt";

/// A byte range of one file.
#[derive(Debug, Clone)]
pub struct Zone {
    pub path: PathBuf,
    pub start: u64,
    pub len: u64,
}

impl Zone {
    /// Buffered reader positioned `offset` bytes into the zone and limited to
    /// the zone's end.
    pub fn reader_at(&self, offset: u64) -> Result<Take<BufReader<File>>> {
        ensure!(
            offset <= self.len,
            "offset {offset} past end of zone ({} bytes) in {}",
            self.len,
            self.path.display()
        );
        let mut file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.seek(SeekFrom::Start(self.start + offset))?;
        Ok(BufReader::new(file).take(self.len - offset))
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len as usize);
        self.reader_at(0)?.read_to_end(&mut buf)?;
        ensure!(
            buf.len() as u64 == self.len,
            "zone in {} is short: {} of {} bytes",
            self.path.display(),
            buf.len(),
            self.len
        );
        Ok(buf)
    }
}

/// The four zones of one table.
#[derive(Debug, Clone)]
pub struct Zones {
    pub data: Zone,
    pub index: Zone,
    pub summary: Zone,
    pub filter: Zone,
}

impl Zones {
    /// Resolves zone positions for the table directory `dir`.
    pub fn locate(dir: &Path, layout: TableLayout) -> Result<Self> {
        match layout {
            TableLayout::SingleFile => {
                let path = dir.join(SINGLE_FILE);
                let mut file =
                    File::open(&path).with_context(|| format!("open {}", path.display()))?;
                let file_len = file.metadata()?.len();
                let header = ZoneHeader::read_from(&mut file)
                    .with_context(|| format!("read header of {}", path.display()))?;

                let index_start = HEADER_BYTES + header.data_len;
                let summary_start = index_start + header.index_len;
                let filter_start = summary_start + header.summary_len;
                ensure!(
                    filter_start <= file_len,
                    "zone lengths exceed file size in {}",
                    path.display()
                );

                let zone = |start: u64, len: u64| Zone {
                    path: path.clone(),
                    start,
                    len,
                };
                Ok(Self {
                    data: zone(HEADER_BYTES, header.data_len),
                    index: zone(index_start, header.index_len),
                    summary: zone(summary_start, header.summary_len),
                    filter: zone(filter_start, file_len - filter_start),
                })
            }
            TableLayout::MultiFile => {
                let whole = |name: &str| -> Result<Zone> {
                    let path = dir.join(name);
                    let len = fs::metadata(&path)
                        .with_context(|| format!("stat {}", path.display()))?
                        .len();
                    Ok(Zone { path, start: 0, len })
                };
                Ok(Self {
                    data: whole(DATA_FILE)?,
                    index: whole(INDEX_FILE)?,
                    summary: whole(SUMMARY_FILE)?,
                    filter: whole(FILTER_FILE)?,
                })
            }
        }
    }
}

/// Encoded zone contents of a table about to be written.
pub struct ZoneBytes<'a> {
    pub data: &'a [u8],
    pub index: &'a [u8],
    pub summary: &'a [u8],
    pub filter: &'a [u8],
}

/// Writes the zones into `dir` according to `layout`, fsyncing each file.
pub fn write_zones(dir: &Path, layout: TableLayout, zones: &ZoneBytes<'_>) -> Result<()> {
    match layout {
        TableLayout::SingleFile => {
            let header = ZoneHeader {
                data_len: zones.data.len() as u64,
                index_len: zones.index.len() as u64,
                summary_len: zones.summary.len() as u64,
            };
            let mut file = File::create(dir.join(SINGLE_FILE))?;
            file.write_all(&header.encode())?;
            file.write_all(zones.data)?;
            file.write_all(zones.index)?;
            file.write_all(zones.summary)?;
            file.write_all(zones.filter)?;
            file.sync_all()?;
        }
        TableLayout::MultiFile => {
            for (name, bytes) in [
                (DATA_FILE, zones.data),
                (INDEX_FILE, zones.index),
                (SUMMARY_FILE, zones.summary),
                (FILTER_FILE, zones.filter),
            ] {
                write_synced(&dir.join(name), bytes)?;
            }
        }
    }
    Ok(())
}

pub fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
