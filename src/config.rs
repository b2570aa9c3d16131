//! Run configuration shared by the pipeline stages.

use std::env;
use std::path::PathBuf;
use std::process;

/// Partitions never hold more seed hits than this unless a single query's
/// hit-group alone exceeds it.
pub const MAX_PARTITION_HITS: usize = 65536;
/// Upper bound on the number of partitions per shard phase.
pub const MAX_PARTITIONS: usize = 4096;

/// Configuration for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Worker thread count for the align phase.
    pub threads: usize,
    /// Backlog limit is `threads * backlog_multiplier` claimed-but-unflushed
    /// partitions; this is the sole backpressure point.
    pub backlog_multiplier: usize,
    pub max_partition_hits: usize,
    pub max_partitions: usize,
    /// Frame contexts per source query (1, or 6 for translated searches).
    /// Hits whose packed query ids share `query / contexts` belong to the
    /// same source query and are never split across partitions.
    pub contexts: u32,
    /// Directory holding per-shard temporary output files.
    pub tmpdir: PathBuf,
    /// Per-run token embedded in temporary file names so concurrent runs
    /// sharing a temp directory do not collide.
    pub run_token: u32,
    pub verbose: bool,
}

impl PipelineConfig {
    /// Lower bound on the partition count, sized so every worker has a few
    /// partitions to claim.
    pub fn min_partitions(&self) -> usize {
        self.threads.max(1) * 4
    }

    pub fn backlog_limit(&self) -> usize {
        (self.threads * self.backlog_multiplier).max(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            backlog_multiplier: 2,
            max_partition_hits: MAX_PARTITION_HITS,
            max_partitions: MAX_PARTITIONS,
            contexts: 1,
            tmpdir: env::temp_dir(),
            run_token: process::id(),
            verbose: false,
        }
    }
}

/// Per-query policy deciding how many candidate matches are retained in the
/// final output.
///
/// With `top_percent` unset, the best `max_alignments` subjects per query are
/// kept. With it set, every record scoring within the given percentage of the
/// query's top score is kept instead, regardless of rank.
#[derive(Clone, Copy, Debug)]
pub struct RankFilter {
    pub max_alignments: usize,
    pub top_percent: Option<f64>,
}

impl RankFilter {
    pub fn keep(&self, rank: usize, score: i32, top_score: i32) -> bool {
        match self.top_percent {
            Some(top) => score as f64 >= top_score as f64 * (1.0 - top / 100.0),
            None => rank < self.max_alignments,
        }
    }
}

impl Default for RankFilter {
    fn default() -> Self {
        Self {
            max_alignments: 25,
            top_percent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_filter_top_n() {
        let filter = RankFilter {
            max_alignments: 2,
            top_percent: None,
        };
        assert!(filter.keep(0, 10, 100));
        assert!(filter.keep(1, 10, 100));
        assert!(!filter.keep(2, 100, 100));
    }

    #[test]
    fn test_rank_filter_score_range() {
        let filter = RankFilter {
            max_alignments: 1,
            top_percent: Some(10.0),
        };
        // Within 10% of the top score: kept regardless of rank.
        assert!(filter.keep(5, 95, 100));
        assert!(filter.keep(5, 90, 100));
        assert!(!filter.keep(0, 89, 100));
    }
}
