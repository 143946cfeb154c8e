//! Run-wide progress accounting for probe completion.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

/// Monotonic counter of completed probes.
///
/// Sized up front from the expanded target and port lists: one unit per
/// (host, port) pair. The probing engine advances it exactly once per probe
/// it attempts or skips, so at normal completion `done() == total()`; a
/// cancelled run simply stops short. Shared across tasks behind an `Arc`,
/// advancing is lock-free.
pub struct Progress {
    total: u64,
    done: AtomicU64,
    bar: Option<ProgressBar>,
}

impl Progress {
    /// Counter without a terminal bar, for JSON output and library use.
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            total,
            done: AtomicU64::new(0),
            bar: None,
        }
    }

    /// Counter mirrored on an interactive terminal bar.
    #[must_use]
    pub fn with_bar(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            total,
            done: AtomicU64::new(0),
            bar: Some(bar),
        }
    }

    /// Records `n` more completed probes.
    pub fn advance(&self, n: u64) {
        self.done.fetch_add(n, Ordering::Relaxed);
        if let Some(bar) = &self.bar {
            bar.inc(n);
        }
    }

    /// Probes completed so far.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Probes planned for the whole run.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Stops the bar redraw loop. The counter itself needs no teardown.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total)
            .field("done", &self.done.load(Ordering::Relaxed))
            .finish()
    }
}
