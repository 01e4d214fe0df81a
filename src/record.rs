use prost::Message;

/// A single log entry: an opaque payload plus the absolute offset the
/// log assigned to it on append.
///
/// The offset is stamped by the segment before the record is encoded,
/// so a decoded record always reports the offset it lives at.
#[derive(Clone, PartialEq, Message)]
pub struct Record {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub offset: u64,
}

impl Record {
    pub fn new(value: Vec<u8>) -> Self {
        Record { value, offset: 0 }
    }
}
