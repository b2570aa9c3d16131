//! Per-channel record buffers filled by the align workers.
//!
//! Buffers are exclusively owned: a worker fills them, the reassembly queue
//! holds them, the output writer consumes them. In tagged mode every record
//! carries a fixed-size meta header whose `len` field is patched once the
//! record body has been rendered, so the merge stage can skip or copy a whole
//! record without decoding it.

use anyhow::{bail, Result};
use std::io::Read;

pub const SEGMENT_META_SIZE: usize = 16;

/// Meta header preceding each serialized record in a shard temp stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentMeta {
    pub query_id: u32,
    pub subject_id: u32,
    pub score: i32,
    /// Exact byte length of the record body following this header.
    pub len: u32,
}

impl SegmentMeta {
    pub fn new(query_id: u32, subject_id: u32, score: i32) -> Self {
        Self {
            query_id,
            subject_id,
            score,
            len: 0,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.query_id.to_le_bytes());
        out.extend_from_slice(&self.subject_id.to_le_bytes());
        out.extend_from_slice(&self.score.to_le_bytes());
        out.extend_from_slice(&self.len.to_le_bytes());
    }

    pub fn from_bytes(buf: &[u8; SEGMENT_META_SIZE]) -> Self {
        Self {
            query_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            subject_id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            score: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            len: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }

    /// Read the next header from a shard stream. A clean end of stream yields
    /// `None`; a header cut short mid-record is a malformed-shard error.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut buf = [0u8; SEGMENT_META_SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            let n = reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < buf.len() {
            bail!("unexpected end of stream inside a segment header");
        }
        Ok(Some(Self::from_bytes(&buf)))
    }
}

/// Growable byte buffer for one output channel.
pub struct RecordBuffer {
    data: Vec<u8>,
    tagged: bool,
}

impl RecordBuffer {
    /// `tagged` buffers prepend a `SegmentMeta` to every record, for streams
    /// that feed the shard merge.
    pub fn new(tagged: bool) -> Self {
        Self {
            data: Vec::new(),
            tagged,
        }
    }

    /// Whether records written here carry segment meta headers.
    pub fn tagged(&self) -> bool {
        self.tagged
    }

    /// Append one rendered record. `render` writes the record body; in tagged
    /// mode the header's `len` is back-patched to the exact body length.
    pub fn write_record<F>(&mut self, query_id: u32, subject_id: u32, score: i32, render: F)
    where
        F: FnOnce(&mut Vec<u8>),
    {
        if !self.tagged {
            render(&mut self.data);
            return;
        }
        let header_at = self.data.len();
        SegmentMeta::new(query_id, subject_id, score).write_to(&mut self.data);
        let body_at = self.data.len();
        render(&mut self.data);
        let body_len = (self.data.len() - body_at) as u32;
        self.data[header_at + 12..header_at + SEGMENT_META_SIZE]
            .copy_from_slice(&body_len.to_le_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
