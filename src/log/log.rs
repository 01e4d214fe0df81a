use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};
use thiserror::Error;
use tracing::{debug, info};

use super::index::IndexError;
use super::segment::{Segment, SegmentError};
use super::store::StoreError;
use crate::record::Record;

const DEFAULT_MAX_BYTES: u64 = 1024;

/// Configuration for a log and its segments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    segment: SegmentConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SegmentConfig {
    max_store_bytes: u64,
    max_index_bytes: u64,
    initial_offset: u64,
}

impl Config {
    pub fn max_store_bytes(&self) -> u64 {
        self.segment.max_store_bytes
    }

    pub fn max_index_bytes(&self) -> u64 {
        self.segment.max_index_bytes
    }

    pub fn initial_offset(&self) -> u64 {
        self.segment.initial_offset
    }

    /// Re-applies the zero-means-default rule, so a config that
    /// arrived through deserialization gets the same treatment as one
    /// from the builder.
    fn with_defaults(self) -> Config {
        ConfigBuilder::new(
            self.segment.max_store_bytes,
            self.segment.max_index_bytes,
            self.segment.initial_offset,
        )
        .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new(0, 0, 0).build()
    }
}

/// Builder for [`Config`]. A zero ceiling for the store or the index
/// is replaced with the 1024-byte default at build time.
pub struct ConfigBuilder {
    max_store_bytes: u64,
    max_index_bytes: u64,
    initial_offset: u64,
}

impl ConfigBuilder {
    pub fn new(max_store_bytes: u64, max_index_bytes: u64, initial_offset: u64) -> Self {
        ConfigBuilder {
            max_store_bytes,
            max_index_bytes,
            initial_offset,
        }
    }

    pub fn build(self) -> Config {
        let or_default = |bytes: u64| if bytes == 0 { DEFAULT_MAX_BYTES } else { bytes };
        Config {
            segment: SegmentConfig {
                max_store_bytes: or_default(self.max_store_bytes),
                max_index_bytes: or_default(self.max_index_bytes),
                initial_offset: self.initial_offset,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("offset {0} not found")]
    OffsetNotFound(u64),
    #[error("log is closed")]
    Closed,
    #[error("{0} is not a segment file")]
    InvalidSegmentFile(PathBuf),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An ordered collection of segments in one directory.
///
/// The segment with the greatest base offset is the active one and
/// receives every append; the rest are read-only history. Appends and
/// structural changes take the write lock, reads take it shared.
pub struct Log {
    dir: PathBuf,
    config: Arc<Config>,
    inner: RwLock<Inner>,
}

struct Inner {
    /// Ordered oldest to newest; the last segment is the active one.
    /// Emptied by `close`.
    segments: Vec<Segment>,
}

impl Log {
    /// Opens the log in `dir`, recovering any segments already on
    /// disk. The directory is created if it does not exist; an empty
    /// directory gets a single segment at the configured initial
    /// offset.
    pub fn open(dir: impl Into<PathBuf>, config: Config) -> Result<Log, LogError> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }

        let log = Log {
            dir,
            config: Arc::new(config.with_defaults()),
            inner: RwLock::new(Inner { segments: vec![] }),
        };
        log.setup()?;
        Ok(log)
    }

    fn setup(&self) -> Result<(), LogError> {
        let mut inner = self.inner.write().unwrap();

        let mut base_offsets: Vec<u64> = vec![];
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();

            // Segments are discovered through their store files alone;
            // index files carry the same stem and anything else in the
            // directory is not ours to interpret.
            if path.extension().and_then(|ext| ext.to_str()) != Some("store") {
                continue;
            }
            let base_offset = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
                .ok_or_else(|| LogError::InvalidSegmentFile(path.clone()))?;
            base_offsets.push(base_offset);
        }
        base_offsets.sort_unstable();

        for base_offset in base_offsets {
            let segment = Segment::new(&self.dir, base_offset, self.config.clone())?;
            inner.segments.push(segment);
        }
        if inner.segments.is_empty() {
            let segment = Segment::new(&self.dir, self.config.initial_offset(), self.config.clone())?;
            inner.segments.push(segment);
        }

        info!(
            dir = %self.dir.display(),
            segments = inner.segments.len(),
            "log opened"
        );
        Ok(())
    }

    fn roll(&self, inner: &mut Inner, base_offset: u64) -> Result<(), LogError> {
        info!(base_offset, "rolling over to a new segment");
        let segment = Segment::new(&self.dir, base_offset, self.config.clone())?;
        inner.segments.push(segment);
        Ok(())
    }

    /// Appends an opaque payload, returning the offset it was
    /// assigned. Rolls the active segment over first when it has
    /// reached a size ceiling.
    pub fn append(&self, value: Vec<u8>) -> Result<u64, LogError> {
        let mut inner = self.inner.write().unwrap();

        let active = inner.segments.last().ok_or(LogError::Closed)?;
        // Rolling over an empty segment would recreate it at the same
        // base offset, so a roll requires at least one record.
        if active.is_maxed() && active.next_offset() > active.base_offset() {
            let base_offset = active.next_offset();
            self.roll(&mut inner, base_offset)?;
        }

        let mut record = Record::new(value);
        match inner.segments.last_mut().unwrap().append(&mut record) {
            Ok(offset) => Ok(offset),
            // A record can outgrow the room left in a segment that is
            // not yet maxed; give it one fresh segment before giving
            // up.
            Err(e @ (SegmentError::Store(StoreError::NoSpace) | SegmentError::Index(IndexError::Eof))) => {
                let active = inner.segments.last().unwrap();
                if active.next_offset() == active.base_offset() {
                    return Err(e.into());
                }
                let base_offset = active.next_offset();
                self.roll(&mut inner, base_offset)?;
                let offset = inner.segments.last_mut().unwrap().append(&mut record)?;
                Ok(offset)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the record at `offset` from whichever segment owns it.
    pub fn read(&self, offset: u64) -> Result<Record, LogError> {
        let inner = self.inner.read().unwrap();

        let segment = inner
            .segments
            .iter()
            .find(|s| s.base_offset() <= offset && offset < s.next_offset())
            .ok_or(LogError::OffsetNotFound(offset))?;

        segment.read(offset).map_err(|e| match e {
            // An in-range offset that still misses the index was never
            // written, such as a gap between recovered segments.
            SegmentError::Index(IndexError::Eof) => LogError::OffsetNotFound(offset),
            e => e.into(),
        })
    }

    /// Base offset of the oldest segment.
    pub fn lowest_offset(&self) -> Result<u64, LogError> {
        let inner = self.inner.read().unwrap();
        inner
            .segments
            .first()
            .map(|s| s.base_offset())
            .ok_or(LogError::Closed)
    }

    /// The last offset assigned, or 0 on a virgin log.
    pub fn highest_offset(&self) -> Result<u64, LogError> {
        let inner = self.inner.read().unwrap();
        let next = inner
            .segments
            .last()
            .map(|s| s.next_offset())
            .ok_or(LogError::Closed)?;
        Ok(if next == 0 { 0 } else { next - 1 })
    }

    /// Removes every segment whose highest offset is at or below
    /// `lowest`. The active segment is always retained, so truncation
    /// never leaves the log unable to append.
    pub fn truncate(&self, lowest: u64) -> Result<(), LogError> {
        let mut inner = self.inner.write().unwrap();
        if inner.segments.is_empty() {
            return Err(LogError::Closed);
        }

        let last = inner.segments.len() - 1;
        let keep_from = inner.segments[..last]
            .iter()
            .position(|s| s.next_offset() > lowest.saturating_add(1))
            .unwrap_or(last);
        if keep_from == 0 {
            return Ok(());
        }

        debug!(lowest, removed = keep_from, "truncating log");
        for segment in inner.segments.drain(..keep_from) {
            segment.remove()?;
        }
        Ok(())
    }

    /// Closes every segment, index before store. The log refuses
    /// appends afterwards.
    pub fn close(&self) -> Result<(), LogError> {
        let mut inner = self.inner.write().unwrap();
        for segment in inner.segments.drain(..) {
            segment.close()?;
        }
        Ok(())
    }

    /// Closes the log, then deletes every segment file and the log
    /// directory itself.
    pub fn remove(self) -> Result<(), LogError> {
        {
            let mut inner = self.inner.write().unwrap();
            for segment in inner.segments.drain(..) {
                segment.remove()?;
            }
        }
        std::fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        // close drains the segments; a second pass is a no-op.
        let _ = self.close();
    }
}
