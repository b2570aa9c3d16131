//! Parallel align phase: worker pool over the ordered reassembly queue.

pub mod error;
pub mod task_queue;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::thread;

use crate::config::PipelineConfig;
use crate::output::{ChannelSet, RecordBuffer};
use crate::search::SeedHit;
use crate::stats::Statistics;
use error::ErrorState;
use task_queue::TaskQueue;

/// The alignment collaborator: turns one partition of seed hits into
/// rendered records on the per-channel buffers, accumulating into the
/// worker-local statistics.
pub trait Aligner: Sync {
    fn align(
        &self,
        hits: &[SeedHit],
        out: &mut [RecordBuffer],
        stats: &mut Statistics,
    ) -> Result<()>;
}

/// Run the align phase: a fixed pool of workers claims partitions from the
/// reassembly queue, aligns them and submits the resulting buffers, which the
/// queue releases to the channel set strictly in partition order.
///
/// The first error from any worker cancels the queue; remaining workers stop
/// claiming, already-submitted results ahead of the gap still reach the
/// output, and the error is re-raised here after the pool has joined.
pub fn align_partitions<A: Aligner>(
    hits: &[SeedHit],
    bounds: &[usize],
    aligner: &A,
    channels: &mut ChannelSet,
    stats: &mut Statistics,
    config: &PipelineConfig,
) -> Result<()> {
    let parts = bounds.len().saturating_sub(1);
    if parts == 0 {
        return Ok(());
    }
    let threads = config.threads.max(1);
    let tagged = channels.tagged();
    let channel_count = channels.channel_count();

    let progress = if config.verbose {
        let bar = ProgressBar::new(parts as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap(),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let errors = ErrorState::new();
    let shared_stats = Mutex::new(Statistics::new());
    let queue = TaskQueue::new(parts, config.backlog_limit(), |pieces: Vec<Vec<u8>>| {
        channels.write_pieces(pieces)
    });

    thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let mut local = Statistics::new();
                loop {
                    if errors.is_set() {
                        break;
                    }
                    let Some(index) = queue.claim() else {
                        break;
                    };
                    let range = &hits[bounds[index]..bounds[index + 1]];
                    let mut buffers: Vec<RecordBuffer> =
                        (0..channel_count).map(|_| RecordBuffer::new(tagged)).collect();
                    let outcome = aligner
                        .align(range, &mut buffers, &mut local)
                        .and_then(|()| {
                            let pieces = buffers.into_iter().map(RecordBuffer::into_bytes).collect();
                            queue.submit(index, pieces)
                        });
                    match outcome {
                        Ok(()) => progress.inc(1),
                        Err(err) => {
                            errors.set(err);
                            queue.cancel();
                            break;
                        }
                    }
                }
                *shared_stats.lock().unwrap() += &local;
            });
        }
    });
    progress.finish_and_clear();

    *stats += &shared_stats.into_inner().unwrap();
    errors.into_result()
}
