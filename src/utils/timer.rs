//! Phase timing for the run log.

use std::time::Instant;

/// Logs a phase label when it starts and the elapsed time when it finishes.
pub struct PhaseTimer {
    label: String,
    start: Instant,
    verbose: bool,
    done: bool,
}

impl PhaseTimer {
    pub fn start(label: impl Into<String>, verbose: bool) -> Self {
        let label = label.into();
        if verbose {
            eprintln!("{label}...");
        }
        Self {
            label,
            start: Instant::now(),
            verbose,
            done: false,
        }
    }

    /// Finish the current phase and start the next one.
    pub fn go(&mut self, label: impl Into<String>) {
        self.report();
        self.label = label.into();
        self.start = Instant::now();
        self.done = false;
        if self.verbose {
            eprintln!("{}...", self.label);
        }
    }

    pub fn finish(mut self) {
        self.report();
    }

    fn report(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if self.verbose {
            eprintln!("{} done [{:.2}s]", self.label, self.start.elapsed().as_secs_f64());
        }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.report();
    }
}
