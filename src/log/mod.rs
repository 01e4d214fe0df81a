//! The persistent segmented log: one store file and one memory-mapped
//! index per segment, one directory of segments per log.

mod index;
mod log;
mod segment;
mod store;

pub use index::{Index, IndexError};
pub use log::{Config, ConfigBuilder, Log, LogError};
pub use segment::{Segment, SegmentError};
pub use store::{Store, StoreError};

/// Bytes used for the length prefix framing each stored record.
pub const LEN_WIDTH: u64 = 8;
/// Bytes used for the relative-offset half of an index entry.
pub const OFFSET_WIDTH: u64 = 4;
/// Bytes used for the store-position half of an index entry.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one complete index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;
