//! Output buffers, channel writers and the shard merge.

pub mod buffer;
pub mod join;
pub mod writer;

pub use buffer::{RecordBuffer, SegmentMeta, SEGMENT_META_SIZE};
pub use writer::ChannelSet;
