use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;

use crate::log::log::Config;
use crate::log::LEN_WIDTH;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store is full")]
    NoSpace,
    #[error("store has no record at position {0}")]
    OffsetNotFound(u64),
    #[error("corrupt record at position {0}")]
    Corruption(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The append-only file where a segment keeps its records, each framed
/// as an 8-byte big-endian length prefix followed by the payload.
///
/// Writes go through a buffered writer; positional reads flush the
/// buffer first so a record is readable as soon as its append returns.
/// All operations serialize on an internal mutex.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<StoreInner>,
    path: PathBuf,
    config: Arc<Config>,
}

#[derive(Debug)]
struct StoreInner {
    writer: BufWriter<File>,
    /// Total bytes written, buffered or flushed.
    size: u64,
}

impl Store {
    pub fn new(path: PathBuf, config: Arc<Config>) -> Result<Store, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();

        Ok(Store {
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(file),
                size,
            }),
            path,
            config,
        })
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap().size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a length-prefixed record. Returns the total bytes
    /// written and the position the record starts at.
    pub fn append(&self, value: &[u8]) -> Result<(u64, u64), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.size + value.len() as u64 + LEN_WIDTH > self.config.max_store_bytes() {
            return Err(StoreError::NoSpace);
        }

        let position = inner.size;
        inner.writer.write_u64::<BigEndian>(value.len() as u64)?;
        inner.writer.write_all(value)?;

        let written = value.len() as u64 + LEN_WIDTH;
        inner.size += written;
        Ok((written, position))
    }

    /// Reads the record framed at `position`.
    pub fn read(&self, position: u64) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.writer.flush()?;

        // An empty store has no readable offsets, and a position past
        // the written region cannot hold a length prefix.
        if position.saturating_add(LEN_WIDTH) > inner.size {
            return Err(StoreError::OffsetNotFound(position));
        }

        let file = inner.writer.get_ref();
        let mut prefix = [0u8; LEN_WIDTH as usize];
        file.read_exact_at(&mut prefix, position)?;
        let len = BigEndian::read_u64(&prefix);

        match position.checked_add(LEN_WIDTH).and_then(|p| p.checked_add(len)) {
            Some(end) if end <= inner.size => {}
            _ => return Err(StoreError::Corruption(position)),
        }

        let mut value = vec![0u8; len as usize];
        file.read_exact_at(&mut value, position + LEN_WIDTH)?;
        Ok(value)
    }

    /// Reads raw bytes at `offset` into the caller's buffer, flushing
    /// buffered writes first.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.writer.flush()?;

        let n = inner.writer.get_ref().read_at(buf, offset)?;
        Ok(n)
    }

    /// Flushes buffered writes and syncs the file to disk.
    pub fn close(self) -> Result<(), StoreError> {
        let mut inner = self.inner.into_inner().unwrap();
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::log::log::ConfigBuilder;
    use tempfile::tempdir;

    fn test_config(max_store_bytes: u64) -> Arc<Config> {
        Arc::new(ConfigBuilder::new(max_store_bytes, 1024, 0).build())
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("0.store"), test_config(1024)).unwrap();

        let records: Vec<&[u8]> = vec![b"first", b"second record", b"third"];
        let mut positions = vec![];
        for value in &records {
            let (written, position) = store.append(value).unwrap();
            assert_eq!(written, value.len() as u64 + LEN_WIDTH);
            positions.push(position);
        }

        for (value, position) in records.iter().zip(positions) {
            assert_eq!(store.read(position).unwrap(), *value);
        }
    }

    #[test]
    fn read_on_empty_store_finds_nothing() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("0.store"), test_config(1024)).unwrap();

        assert!(matches!(store.read(0), Err(StoreError::OffsetNotFound(0))));
    }

    #[test]
    fn append_past_ceiling_reports_no_space() {
        let dir = tempdir().unwrap();
        // Room for exactly one 12-byte record and its prefix.
        let store = Store::new(dir.path().join("0.store"), test_config(20)).unwrap();

        store.append(b"exactly-12by").unwrap();
        assert!(matches!(store.append(b"x"), Err(StoreError::NoSpace)));
    }

    #[test]
    fn reopening_recovers_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        let store = Store::new(path.clone(), test_config(1024)).unwrap();
        let (_, position) = store.append(b"durable").unwrap();
        store.close().unwrap();

        let store = Store::new(path, test_config(1024)).unwrap();
        assert_eq!(store.size(), 7 + LEN_WIDTH);
        assert_eq!(store.read(position).unwrap(), b"durable");
    }

    #[test]
    fn read_at_returns_raw_frame_bytes() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("0.store"), test_config(1024)).unwrap();
        store.append(b"abc").unwrap();

        let mut buf = [0u8; 11];
        let n = store.read_at(&mut buf, 0).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf[..8], &[0, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&buf[8..], b"abc");
    }

    #[test]
    fn oversized_length_prefix_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        // A frame that claims 100 bytes of payload but carries 3.
        let mut frame = vec![0u8; LEN_WIDTH as usize];
        BigEndian::write_u64(&mut frame, 100);
        frame.extend_from_slice(b"abc");
        std::fs::write(&path, &frame).unwrap();

        let store = Store::new(path, test_config(1024)).unwrap();
        assert!(matches!(store.read(0), Err(StoreError::Corruption(0))));
    }
}
