use byteorder::{BigEndian, ByteOrder};
use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

use crate::log::log::Config;
use crate::log::{ENTRY_WIDTH, OFFSET_WIDTH};

#[derive(Error, Debug)]
pub enum IndexError {
    /// The index is out of room on write, or a read went past the last
    /// entry written.
    #[error("end of index")]
    Eof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The memory-mapped table mapping a segment's relative offsets to
/// byte positions in its store.
///
/// Each entry is 12 bytes: a big-endian u32 relative offset followed
/// by a big-endian u64 store position. The backing file is truncated
/// up to the configured capacity before mapping (the map cannot grow)
/// and truncated back down to the written entries on close, so a
/// reopen recovers the entry count from the file size alone.
#[derive(Debug)]
pub struct Index {
    file: File,
    mmap: MmapMut,
    /// Bytes occupied by real entries; always a multiple of the entry
    /// width.
    size: u64,
    path: PathBuf,
}

impl Index {
    pub fn new(path: PathBuf, config: Arc<Config>) -> Result<Index, IndexError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let size = file.metadata()?.len();

        // Truncate up so the map has room to grow; never down, so
        // existing entries survive a capacity change.
        if size < config.max_index_bytes() {
            file.set_len(config.max_index_bytes())?;
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Index {
            file,
            mmap,
            size,
            path,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far.
    pub fn len(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Reads the entry at `offset`, a relative offset into this
    /// segment's range. The sentinel `-1` reads the last entry
    /// written, which is how a segment recovers its next offset.
    pub fn read(&self, offset: i64) -> Result<(u32, u64), IndexError> {
        if self.size == 0 {
            return Err(IndexError::Eof);
        }

        let entry = if offset == -1 {
            self.size / ENTRY_WIDTH - 1
        } else if offset < 0 || offset > u32::MAX as i64 {
            return Err(IndexError::Eof);
        } else {
            offset as u64
        };

        let start = entry * ENTRY_WIDTH;
        if start + ENTRY_WIDTH > self.size {
            return Err(IndexError::Eof);
        }

        let start = start as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;

        let relative_offset = BigEndian::read_u32(&self.mmap[start..mid]);
        let position = BigEndian::read_u64(&self.mmap[mid..end]);
        Ok((relative_offset, position))
    }

    /// Appends one entry. `Eof` means the mapped region is out of room
    /// and the owning segment is maxed.
    pub fn write(&mut self, offset: u32, position: u64) -> Result<(), IndexError> {
        if self.size + ENTRY_WIDTH > self.mmap.len() as u64 {
            return Err(IndexError::Eof);
        }

        let start = self.size as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;

        BigEndian::write_u32(&mut self.mmap[start..mid], offset);
        BigEndian::write_u64(&mut self.mmap[mid..end], position);

        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Syncs the map and the file, then truncates the file down to the
    /// entries actually written.
    ///
    /// Skipping close leaves the file at its reserved capacity; a
    /// reopen would then see the capacity as the logical size and
    /// treat the index as full.
    pub fn close(self) -> Result<(), IndexError> {
        self.mmap.flush()?;
        self.file.sync_all()?;
        self.file.set_len(self.size)?;
        Ok(())
    }
}
