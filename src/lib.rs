//! An append-only, persistent commit log.
//!
//! Records are opaque byte payloads assigned strictly increasing
//! 64-bit offsets. On disk a log is a directory of segments, each a
//! pair of files: a store holding length-prefixed records and a
//! memory-mapped index mapping relative offsets to store positions.

pub mod log;
pub mod record;

pub use log::{Config, ConfigBuilder, Log, LogError};
pub use record::Record;

/// The capability a log offers its callers: append a payload, read it
/// back by offset, shut down cleanly.
///
/// [`Log`] is the persistent implementation; in-memory or mock
/// implementations can stand in for it behind this trait.
pub trait CommitLog {
    fn append(&self, value: Vec<u8>) -> Result<u64, LogError>;
    fn read(&self, offset: u64) -> Result<Record, LogError>;
    fn close(&self) -> Result<(), LogError>;
}

impl CommitLog for Log {
    fn append(&self, value: Vec<u8>) -> Result<u64, LogError> {
        Log::append(self, value)
    }

    fn read(&self, offset: u64) -> Result<Record, LogError> {
        Log::read(self, offset)
    }

    fn close(&self) -> Result<(), LogError> {
        Log::close(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_is_usable_behind_the_capability_trait() {
        let dir = tempdir().unwrap();
        let log: Box<dyn CommitLog> =
            Box::new(Log::open(dir.path(), Config::default()).unwrap());

        let offset = log.append(b"behind a trait".to_vec()).unwrap();
        let record = log.read(offset).unwrap();
        assert_eq!(record.value, b"behind a trait");
        assert_eq!(record.offset, offset);

        log.close().unwrap();
        assert!(matches!(
            log.append(b"late".to_vec()),
            Err(LogError::Closed)
        ));
    }
}
