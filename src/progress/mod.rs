//! Shared progress counters and their terminal renderer.
//!
//! A [`ProgressGauge`] is a {counter, total} pair updated by the pool and the
//! clients; the [`ProgressReporter`] only reads it. The core never blocks on
//! the reporter.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Counter/total pair observed by the progress display.
///
/// Counters are plain atomics so every connection can update them from its
/// own task without coordination.
#[derive(Debug, Default)]
pub struct ProgressGauge {
    counter: AtomicU64,
    total: AtomicU64,
}

impl ProgressGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Reset the counter at the start of a new round.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }

    pub fn incr(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturating decrement. A transport error followed by the matching close
    /// event can both report the same lost connection, so the counter must
    /// never wrap below zero.
    pub fn decr(&self) {
        let _ = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }
}

/// Renders a [`ProgressGauge`] as a terminal bar on a 50ms cadence.
///
/// Length and position are re-read from the gauge on every tick, so the bar
/// can be started before the round's total is known.
pub struct ProgressReporter {
    gauge: Arc<ProgressGauge>,
    bar: ProgressBar,
    ticker: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn start(gauge: Arc<ProgressGauge>, message: &str) -> Self {
        println!("{message}");

        let bar = ProgressBar::new(gauge.total().max(1));
        bar.set_style(
            ProgressStyle::with_template("[{bar:40}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let ticker = tokio::spawn({
            let bar = bar.clone();
            let gauge = gauge.clone();
            async move {
                let mut tick = tokio::time::interval(Duration::from_millis(50));
                loop {
                    tick.tick().await;
                    let total = gauge.total();
                    if total > 0 {
                        bar.set_length(total);
                    }
                    bar.set_position(gauge.counter().min(gauge.total()));
                }
            }
        });

        Self {
            gauge,
            bar,
            ticker: Some(ticker),
        }
    }

    /// Stop updating, render the final counter value, and leave the bar on
    /// screen.
    pub fn stop(mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        let total = self.gauge.total();
        if total > 0 {
            self.bar.set_length(total);
        }
        self.bar.set_position(self.gauge.counter().min(total));
        self.bar.finish();
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
