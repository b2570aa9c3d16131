//! Output channels and the reassembly queue's sink.
//!
//! A channel set is either the master output files of the run or the
//! per-shard temporary files that feed the block join. The set is the
//! single-threaded sink behind the reassembly queue: the queue's ordering
//! guarantee is what lets one writer safely receive results from many
//! producers.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;

/// Temp file path for one output channel of one reference shard.
pub fn temp_file_name(tmpdir: &Path, token: u32, channel: usize, shard: usize) -> PathBuf {
    tmpdir.join(format!("harrier_{token}_{channel}_{shard}.tmp"))
}

pub struct ChannelSet {
    streams: Vec<BufWriter<File>>,
    paths: Vec<PathBuf>,
    tagged: bool,
}

impl ChannelSet {
    /// Open the master output files, one per channel.
    pub fn master(paths: &[PathBuf]) -> Result<Self> {
        Self::open(paths.to_vec(), false)
    }

    /// Open per-shard temporary files for every channel. Records written
    /// through these carry segment meta headers for the merge stage.
    pub fn temp(channel_count: usize, shard: usize, config: &PipelineConfig) -> Result<Self> {
        let paths = (0..channel_count)
            .map(|channel| temp_file_name(&config.tmpdir, config.run_token, channel, shard))
            .collect();
        Self::open(paths, true)
    }

    fn open(paths: Vec<PathBuf>, tagged: bool) -> Result<Self> {
        let streams = paths
            .iter()
            .map(|path| {
                let file = File::create(path)
                    .with_context(|| format!("failed to create output file {}", path.display()))?;
                Ok(BufWriter::new(file))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            streams,
            paths,
            tagged,
        })
    }

    pub fn tagged(&self) -> bool {
        self.tagged
    }

    pub fn channel_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream_mut(&mut self, channel: usize) -> &mut BufWriter<File> {
        &mut self.streams[channel]
    }

    /// Append one piece per channel; empty pieces are skipped. Ownership of
    /// the buffers ends here.
    pub fn write_pieces(&mut self, pieces: Vec<Vec<u8>>) -> Result<()> {
        for (channel, piece) in pieces.into_iter().enumerate() {
            if piece.is_empty() {
                continue;
            }
            self.streams[channel].write_all(&piece).with_context(|| {
                format!(
                    "failed to write output file {}",
                    self.paths[channel].display()
                )
            })?;
        }
        Ok(())
    }

    /// Flush all channels.
    pub fn finish(&mut self) -> Result<()> {
        for (stream, path) in self.streams.iter_mut().zip(&self.paths) {
            stream
                .flush()
                .with_context(|| format!("failed to flush output file {}", path.display()))?;
        }
        Ok(())
    }
}
