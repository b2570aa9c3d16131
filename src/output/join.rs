//! Block join: N-way streaming merge of per-shard partial outputs.
//!
//! Each reference shard leaves one sorted temp stream per output channel.
//! The merge re-derives the global per-query rank/score-range filter across
//! shards and writes each query's records in descending score order, grouped
//! by query in first-appearance order. Records are moved as raw bytes; the
//! segment meta headers carry everything the merge needs.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::config::{PipelineConfig, RankFilter};
use crate::output::buffer::SegmentMeta;
use crate::output::writer::{temp_file_name, ChannelSet};
use crate::stats::{Counter, Statistics};
use crate::utils::timer::PhaseTimer;

/// Cursor over one shard's temp stream: the current meta header plus the
/// ability to copy or skip exactly the record body it announces.
pub struct ShardCursor {
    reader: BufReader<File>,
    path: PathBuf,
}

impl ShardCursor {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open shard file {}", path.display()))?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
        })
    }

    fn next(&mut self) -> Result<Option<SegmentMeta>> {
        SegmentMeta::read_from(&mut self.reader)
            .with_context(|| format!("malformed shard file {}", self.path.display()))
    }

    fn copy_record<W: Write>(&mut self, len: u32, dest: &mut W) -> Result<()> {
        let copied = io::copy(&mut (&mut self.reader).take(u64::from(len)), dest)
            .with_context(|| format!("failed to copy from shard file {}", self.path.display()))?;
        if copied != u64::from(len) {
            bail!(
                "unexpected end of stream in shard file {} ({copied}/{len} bytes)",
                self.path.display()
            );
        }
        Ok(())
    }

    fn skip_record(&mut self, len: u32) -> Result<()> {
        self.copy_record(len, &mut io::sink())
    }
}

/// Heap entry ordered so `pop()` yields ascending query id, then descending
/// score, then ascending shard index.
struct MergeEntry {
    meta: SegmentMeta,
    shard: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .meta
            .query_id
            .cmp(&self.meta.query_id)
            .then(self.meta.score.cmp(&other.meta.score))
            .then(other.shard.cmp(&self.shard))
    }
}

/// Merge the given shard cursors into `dest`, applying the per-query filter.
pub fn join_shards<W: Write>(
    mut cursors: Vec<ShardCursor>,
    dest: &mut W,
    filter: &RankFilter,
    stats: &mut Statistics,
) -> Result<()> {
    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for (shard, cursor) in cursors.iter_mut().enumerate() {
        if let Some(meta) = cursor.next()? {
            heap.push(MergeEntry { meta, shard });
        }
    }

    let mut query = u32::MAX;
    let mut block = usize::MAX;
    let mut subject = u32::MAX;
    let mut rank = 0usize;
    let mut top_score = 0i32;

    while let Some(entry) = heap.pop() {
        let meta = entry.meta;
        if meta.query_id != query {
            query = meta.query_id;
            rank = 0;
            top_score = meta.score;
            stats.inc(Counter::QueriesAligned);
        }
        // A record for the subject that produced the previous kept record of
        // this query continues that subject's alignment: always kept, never
        // counted against the rank limit.
        let same_subject = entry.shard == block && meta.subject_id == subject;
        let cursor = &mut cursors[entry.shard];
        if filter.keep(rank, meta.score, top_score) || same_subject {
            cursor.copy_record(meta.len, dest)?;
            stats.inc(Counter::Matches);
            if !same_subject {
                block = entry.shard;
                subject = meta.subject_id;
                rank += 1;
            }
        } else {
            cursor.skip_record(meta.len)?;
        }
        if let Some(meta) = cursor.next()? {
            heap.push(MergeEntry {
                meta,
                shard: entry.shard,
            });
        }
    }
    Ok(())
}

/// Join every channel's shard temp files into the master channels, then
/// delete the temp files.
pub fn join_blocks(
    master: &mut ChannelSet,
    shards: usize,
    filter: &RankFilter,
    config: &PipelineConfig,
    stats: &mut Statistics,
) -> Result<()> {
    for channel in 0..master.channel_count() {
        let paths: Vec<PathBuf> = (0..shards)
            .map(|shard| temp_file_name(&config.tmpdir, config.run_token, channel, shard))
            .collect();
        let cursors = paths
            .iter()
            .map(|path| ShardCursor::open(path))
            .collect::<Result<Vec<_>>>()?;
        join_shards(cursors, master.stream_mut(channel), filter, stats)?;
        for path in &paths {
            fs::remove_file(path)
                .with_context(|| format!("failed to remove shard file {}", path.display()))?;
        }
    }
    Ok(())
}

/// Arguments for the standalone `join` subcommand, which merges the shard
/// temp files left behind by an interrupted or deferred run.
#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Directory holding the shard temp files
    #[arg(long, default_value = "/tmp")]
    pub tmpdir: PathBuf,

    /// Run token embedded in the temp file names
    #[arg(long)]
    pub run_token: u32,

    /// Number of reference shards the run was split into
    #[arg(long)]
    pub shards: usize,

    /// Output file, one per channel, in channel order
    #[arg(long = "out", required = true)]
    pub outputs: Vec<PathBuf>,

    /// Maximum alignments to keep per query
    #[arg(long, default_value_t = 25)]
    pub max_alignments: usize,

    /// Keep every record scoring within this percentage of the query's top
    /// score instead of applying the rank limit
    #[arg(long)]
    pub top: Option<f64>,

    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: JoinArgs) -> Result<()> {
    let config = PipelineConfig {
        tmpdir: args.tmpdir.clone(),
        run_token: args.run_token,
        verbose: args.verbose,
        ..PipelineConfig::default()
    };
    let filter = RankFilter {
        max_alignments: args.max_alignments,
        top_percent: args.top,
    };
    let mut stats = Statistics::new();
    let mut master = ChannelSet::master(&args.outputs)?;

    let timer = PhaseTimer::start("Joining shard outputs", config.verbose);
    join_blocks(&mut master, args.shards, &filter, &config, &mut stats)?;
    master.finish()?;
    timer.finish();

    if config.verbose {
        stats.print();
    }
    Ok(())
}
