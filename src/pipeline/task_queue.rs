//! Ordered reassembly queue.
//!
//! Any number of producers complete work for claimed indices in arbitrary
//! order; the sink observes submissions strictly in index order. `claim()` is
//! the sole backpressure point: it suspends producers while `limit` indices
//! are claimed but not yet flushed.

use anyhow::Result;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};

/// Receiver of in-order results. The queue guarantees exactly one call per
/// index, in strictly ascending index order, never concurrently.
pub trait OrderedSink<T> {
    fn accept(&mut self, value: T) -> Result<()>;
}

impl<T, F> OrderedSink<T> for F
where
    F: FnMut(T) -> Result<()>,
{
    fn accept(&mut self, value: T) -> Result<()> {
        self(value)
    }
}

/// Completed-but-not-yet-flushable result, ordered so the heap surfaces the
/// lowest index first.
struct Pending<T> {
    index: usize,
    value: T,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.index.cmp(&self.index)
    }
}

struct QueueState<T> {
    /// Next index to flush.
    head: usize,
    /// Next index to claim.
    tail: usize,
    cancelled: bool,
    pending: BinaryHeap<Pending<T>>,
}

pub struct TaskQueue<T, S> {
    state: Mutex<QueueState<T>>,
    slot_freed: Condvar,
    end: usize,
    limit: usize,
    // Uncontended: the head ordering admits one flusher at a time. The lock
    // makes that invariant explicit to the type system.
    sink: Mutex<S>,
}

impl<T, S: OrderedSink<T>> TaskQueue<T, S> {
    /// Queue over indices `0..end` with at most `limit` claimed-but-unflushed
    /// indices in flight.
    pub fn new(end: usize, limit: usize, sink: S) -> Self {
        Self {
            state: Mutex::new(QueueState {
                head: 0,
                tail: 0,
                cancelled: false,
                pending: BinaryHeap::new(),
            }),
            slot_freed: Condvar::new(),
            end,
            limit: limit.max(1),
            sink: Mutex::new(sink),
        }
    }

    /// Claim the next unclaimed index, suspending while the backlog is full.
    /// Returns `None` once all indices are claimed or the queue is cancelled.
    pub fn claim(&self) -> Option<usize> {
        let mut state = self.state.lock().unwrap();
        while state.tail - state.head >= self.limit && state.tail < self.end && !state.cancelled {
            state = self.slot_freed.wait(state).unwrap();
        }
        if state.cancelled || state.tail >= self.end {
            return None;
        }
        let n = state.tail;
        state.tail += 1;
        let drained = state.tail >= self.end;
        drop(state);
        if drained {
            // Release claimers still parked on the backlog so they can exit.
            self.slot_freed.notify_all();
        }
        Some(n)
    }

    /// Submit the completed result for `index`. Flushes immediately when the
    /// index is next in line, otherwise parks it until the gap closes.
    pub fn submit(&self, index: usize, value: T) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if index != state.head {
                state.pending.push(Pending { index, value });
                return Ok(());
            }
        }
        self.flush(value)
    }

    /// Wake all claimers and refuse further claims. Parked results for
    /// indices past the gap are abandoned with the queue.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancelled = true;
        drop(state);
        self.slot_freed.notify_all();
    }

    fn flush(&self, mut value: T) -> Result<()> {
        loop {
            self.sink.lock().unwrap().accept(value)?;
            let (wake, next) = {
                let mut state = self.state.lock().unwrap();
                let wake = state.tail - state.head >= self.limit;
                state.head += 1;
                let head = state.head;
                let next = if state.pending.peek().is_some_and(|p| p.index == head) {
                    state.pending.pop().map(|p| p.value)
                } else {
                    None
                };
                (wake, next)
            };
            if wake {
                self.slot_freed.notify_one();
            }
            match next {
                Some(v) => value = v,
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicIsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn log_sink(log: Arc<Mutex<Vec<usize>>>) -> impl FnMut(usize) -> Result<()> {
        move |v| {
            log.lock().unwrap().push(v);
            Ok(())
        }
    }

    #[test]
    fn test_in_order_submission_flushes_directly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = TaskQueue::new(3, 8, log_sink(log.clone()));
        for i in 0..3 {
            assert_eq!(queue.claim(), Some(i));
        }
        assert_eq!(queue.claim(), None);
        for i in 0..3 {
            queue.submit(i, i).unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_out_of_order_submission_reassembles() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = TaskQueue::new(3, 8, log_sink(log.clone()));
        while queue.claim().is_some() {}
        queue.submit(2, 2).unwrap();
        queue.submit(0, 0).unwrap();
        queue.submit(1, 1).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_every_permutation_yields_sorted_complete_log() {
        const N: usize = 6;
        let mut order: Vec<usize> = (0..N).collect();
        permute(&mut order, 0, &mut |order| {
            let log = Arc::new(Mutex::new(Vec::new()));
            let queue = TaskQueue::new(N, N, log_sink(log.clone()));
            while queue.claim().is_some() {}
            for &i in order.iter() {
                queue.submit(i, i).unwrap();
            }
            let log = log.lock().unwrap();
            assert_eq!(*log, (0..N).collect::<Vec<_>>(), "order {order:?}");
        });
    }

    fn permute(items: &mut Vec<usize>, k: usize, visit: &mut impl FnMut(&Vec<usize>)) {
        if k == items.len() {
            visit(items);
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, visit);
            items.swap(k, i);
        }
    }

    #[test]
    fn test_backpressure_bounds_claimed_unflushed() {
        const N: usize = 64;
        const LIMIT: usize = 4;
        const WORKERS: usize = 6;
        let in_flight = Arc::new(AtomicIsize::new(0));
        let peak = Arc::new(AtomicIsize::new(0));
        let sink_flight = in_flight.clone();
        let queue = TaskQueue::new(N, LIMIT, move |_v: usize| {
            sink_flight.fetch_sub(1, AtomicOrdering::SeqCst);
            Ok(())
        });
        std::thread::scope(|scope| {
            for _ in 0..WORKERS {
                scope.spawn(|| {
                    while let Some(i) = queue.claim() {
                        let now = in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                        peak.fetch_max(now, AtomicOrdering::SeqCst);
                        if i % 3 == 0 {
                            std::thread::yield_now();
                        }
                        queue.submit(i, i).unwrap();
                    }
                });
            }
        });
        assert!(peak.load(AtomicOrdering::SeqCst) <= LIMIT as isize);
    }

    #[test]
    fn test_cancel_wakes_blocked_claimers() {
        let queue = Arc::new(TaskQueue::new(100, 2, |_: usize| Ok(())));
        // Fill the backlog without flushing.
        assert_eq!(queue.claim(), Some(0));
        assert_eq!(queue.claim(), Some(1));
        let blocked = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.claim())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.cancel();
        assert_eq!(blocked.join().unwrap(), None);
        assert_eq!(queue.claim(), None);
    }

    #[test]
    fn test_sink_error_propagates_to_submitter() {
        let queue = TaskQueue::new(2, 2, |_: usize| -> Result<()> {
            anyhow::bail!("sink failed")
        });
        queue.claim();
        let err = queue.submit(0, 0).unwrap_err();
        assert!(err.to_string().contains("sink failed"));
    }
}
