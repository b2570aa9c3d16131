//! Shared first-error-wins state for a parallel phase.

use anyhow::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Cancellation token shared by all workers of a phase.
///
/// The first stored error wins; later ones are discarded. Workers poll
/// `is_set()` once per loop iteration and stop claiming work when it fires.
/// The stored error is only examined after every worker has exited.
#[derive(Debug, Default)]
pub struct ErrorState {
    failed: AtomicBool,
    slot: Mutex<Option<Error>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, err: Error) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
            self.failed.store(true, Ordering::Release);
        }
    }

    pub fn is_set(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Re-raise the stored error, if any. Called once the phase has joined.
    pub fn into_result(self) -> Result<()> {
        match self.slot.into_inner().unwrap() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
