//! Run driver: per-shard align phases followed by the shard merge.

use anyhow::Result;
use rayon::prelude::*;
use std::path::PathBuf;

use crate::config::{PipelineConfig, RankFilter};
use crate::output::join::join_blocks;
use crate::output::ChannelSet;
use crate::pipeline::{align_partitions, Aligner};
use crate::search::{partition_hits, SeedHit};
use crate::stats::Statistics;
use crate::utils::timer::PhaseTimer;

/// The seed search collaborator: yields the raw hits for each reference
/// shard. Hits need not be sorted; the driver sorts them by query key.
pub trait HitSource {
    fn shard_count(&self) -> usize;
    fn shard_hits(&mut self, shard: usize) -> Result<Vec<SeedHit>>;
}

/// Process every reference shard through the ordered align pipeline and,
/// when more than one shard exists, merge the per-shard outputs into the
/// master channels.
///
/// With a single shard the aligner's own output is final and the rank filter
/// is its responsibility; with multiple shards each shard writes a tagged
/// temp stream and the merge re-derives the global per-query filter.
pub fn run_search<H, A>(
    source: &mut H,
    aligner: &A,
    master_paths: &[PathBuf],
    filter: &RankFilter,
    config: &PipelineConfig,
) -> Result<Statistics>
where
    H: HitSource,
    A: Aligner,
{
    let shards = source.shard_count();
    let contexts = config.contexts.max(1);
    let mut stats = Statistics::new();
    let mut master = ChannelSet::master(master_paths)?;

    for shard in 0..shards {
        let mut timer = PhaseTimer::start(
            format!("Loading seed hits (shard {}/{shards})", shard + 1),
            config.verbose,
        );
        let mut hits = source.shard_hits(shard)?;

        timer.go("Sorting seed hits");
        hits.par_sort_unstable_by_key(|h| h.query);

        timer.go("Partitioning seed hits");
        let bounds = partition_hits(
            &hits,
            |h| h.query_id(contexts),
            config.max_partition_hits,
            config.max_partitions,
            config.min_partitions(),
        );

        timer.go("Computing alignments");
        if shards > 1 {
            let mut channels = ChannelSet::temp(master_paths.len(), shard, config)?;
            align_partitions(&hits, &bounds, aligner, &mut channels, &mut stats, config)?;
            channels.finish()?;
        } else {
            align_partitions(&hits, &bounds, aligner, &mut master, &mut stats, config)?;
        }
        timer.finish();
    }

    if shards > 1 {
        let timer = PhaseTimer::start("Joining shard outputs", config.verbose);
        join_blocks(&mut master, shards, filter, config, &mut stats)?;
        timer.finish();
    }
    master.finish()?;

    if config.verbose {
        stats.print();
    }
    Ok(stats)
}
