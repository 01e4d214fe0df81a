use prost::Message;
use std::{
    path::Path,
    sync::Arc,
};
use thiserror::Error;
use tracing::debug;

use super::index::{Index, IndexError};
use super::store::{Store, StoreError};
use crate::log::log::Config;
use crate::record::Record;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("corrupt record at offset {0}")]
    Corruption(u64),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One store and one index under a shared base offset.
///
/// The segment is where absolute offsets become relative ones: the
/// index stores `offset - base_offset` as a u32, and reads add the
/// base back. `next_offset` is the absolute offset the next append
/// will be stamped with.
pub struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: Arc<Config>,
}

impl Segment {
    /// Opens (or creates) `{base_offset}.store` and
    /// `{base_offset}.index` in `dir`, recovering the next offset from
    /// the index's last entry.
    pub fn new(dir: &Path, base_offset: u64, config: Arc<Config>) -> Result<Segment, SegmentError> {
        let store = Store::new(
            dir.join(format!("{}.store", base_offset)),
            config.clone(),
        )?;
        let index = Index::new(
            dir.join(format!("{}.index", base_offset)),
            config.clone(),
        )?;

        let next_offset = match index.read(-1) {
            Ok((relative_offset, _)) => base_offset + relative_offset as u64 + 1,
            Err(IndexError::Eof) => base_offset,
            Err(e) => return Err(e.into()),
        };
        debug!(base_offset, next_offset, "opened segment");

        Ok(Segment {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Stamps the record with this segment's next offset, appends it
    /// to the store and indexes its position. Returns the absolute
    /// offset assigned.
    ///
    /// If the store append succeeds but the index write does not, the
    /// payload stays in the store unreachable by offset; the log
    /// treats the error as "segment full" and rolls over.
    pub fn append(&mut self, record: &mut Record) -> Result<u64, SegmentError> {
        let offset = self.next_offset;
        record.offset = offset;

        let encoded = record.encode_to_vec();
        let (_, position) = self.store.append(&encoded)?;
        self.index
            .write((offset - self.base_offset) as u32, position)?;

        self.next_offset += 1;
        Ok(offset)
    }

    /// Reads the record stored at the given absolute offset.
    pub fn read(&self, offset: u64) -> Result<Record, SegmentError> {
        let relative = match offset.checked_sub(self.base_offset) {
            Some(relative) => relative,
            None => return Err(IndexError::Eof.into()),
        };

        let (_, position) = self.index.read(relative as i64)?;
        let encoded = self.store.read(position)?;
        let record =
            Record::decode(&encoded[..]).map_err(|_| SegmentError::Corruption(offset))?;
        Ok(record)
    }

    /// True when either the store or the index has reached its
    /// configured ceiling.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes()
            || self.index.size() >= self.config.max_index_bytes()
    }

    /// Closes the index first so its file is synced and truncated
    /// before the store flushes and closes.
    pub fn close(self) -> Result<(), SegmentError> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    /// Closes the segment and deletes both of its files.
    pub fn remove(self) -> Result<(), SegmentError> {
        let index_path = self.index.path().to_path_buf();
        let store_path = self.store.path().to_path_buf();
        self.close()?;

        std::fs::remove_file(index_path)?;
        std::fs::remove_file(store_path)?;
        Ok(())
    }
}
