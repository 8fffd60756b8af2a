//! Fixed-period sweep scheduler for pvpguard.
//!
//! Expired cooldowns, stale combat tags and idle damage sessions are all
//! cleaned up by periodic sweeps. Each sweep loop owns one
//! [`SweepScheduler`], which decides when the next pass is due and watches
//! how long each pass takes.
//!
//! # Disabled mode
//!
//! When `period_ms` is 0, [`SweepScheduler::wait_for_sweep`] pends forever.
//! The owning loop keeps running its other `select!` branches (usually a
//! shutdown signal) and simply never sweeps.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         _ = scheduler.wait_for_sweep() => {
//!             guard.sweep_sessions(clock.now());
//!             scheduler.record_sweep_end();
//!         }
//!     }
//! }
//! ```
//!
//! Missed passes are never replayed: a sweep that wakes late covers
//! everything that expired in the meantime, so the scheduler just resumes
//! from now.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for one sweep loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Time between sweeps in milliseconds. 0 disables the loop.
    pub period_ms: u64,
    /// Fraction of the period (0.0–1.0) a single sweep may use before a
    /// warning is logged.
    pub budget_warn_threshold: f64,
    /// Random delay (0–max ms) added to the first sweep so loops started
    /// together do not sweep in lockstep.
    pub initial_jitter_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            period_ms: 1_000,
            budget_warn_threshold: 0.5,
            initial_jitter_ms: 100,
        }
    }
}

impl SweepConfig {
    /// Shortest allowed period. Anything faster is busy-looping.
    pub const MIN_PERIOD_MS: u64 = 10;

    /// A config for the given period with default thresholds.
    pub fn every(period: Duration) -> Self {
        Self {
            period_ms: u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called by [`SweepScheduler::new`]. Rules:
    /// - a non-zero `period_ms` is at least [`Self::MIN_PERIOD_MS`];
    /// - `budget_warn_threshold` is clamped to `0.0..=1.0`;
    /// - `initial_jitter_ms` is at most one period.
    pub fn validated(mut self) -> Self {
        if self.period_ms != 0 && self.period_ms < Self::MIN_PERIOD_MS {
            warn!(
                period_ms = self.period_ms,
                min = Self::MIN_PERIOD_MS,
                "sweep period below minimum, clamping"
            );
            self.period_ms = Self::MIN_PERIOD_MS;
        }
        if !self.budget_warn_threshold.is_finite() {
            self.budget_warn_threshold = Self::default().budget_warn_threshold;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.initial_jitter_ms = self.initial_jitter_ms.min(self.period_ms);
        self
    }

    /// The period, or `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        (self.period_ms > 0).then(|| Duration::from_millis(self.period_ms))
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Running totals for one sweep loop.
#[derive(Debug, Clone, Default)]
pub struct SweepMetrics {
    pub total_sweeps: u64,
    /// Periods that went by without a sweep because the loop woke late.
    pub total_skipped: u64,
    /// Sweeps that used more than the warning fraction of their period.
    pub total_slow: u64,
    pub max_sweep_time: Duration,
    /// Exponential moving average of sweep time (α = 0.1).
    pub avg_sweep_time: Duration,
}

/// Returned by [`SweepScheduler::wait_for_sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepInfo {
    /// Sequence number, starting at 1.
    pub sweep: u64,
    /// Whole periods missed before this sweep.
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Decides when one sweep loop runs next.
pub struct SweepScheduler {
    name: &'static str,
    config: SweepConfig,
    period: Option<Duration>,
    next_sweep: Option<TokioInstant>,
    sweep_start: Option<Instant>,
    count: u64,
    paused: bool,
    metrics: SweepMetrics,
}

impl SweepScheduler {
    /// Creates a scheduler. `name` labels its log lines.
    pub fn new(name: &'static str, config: SweepConfig) -> Self {
        let config = config.validated();
        let period = config.period();

        let next_sweep = period.map(|p| {
            let jitter = if config.initial_jitter_ms > 0 {
                Duration::from_millis(rand::rng().random_range(0..config.initial_jitter_ms))
            } else {
                Duration::ZERO
            };
            TokioInstant::now() + p + jitter
        });

        match period {
            Some(p) => debug!(sweep = name, period_ms = millis(p), "sweep scheduler created"),
            None => debug!(sweep = name, "sweep scheduler disabled"),
        }

        Self {
            name,
            config,
            period,
            next_sweep,
            sweep_start: None,
            count: 0,
            paused: false,
            metrics: SweepMetrics::default(),
        }
    }

    /// A scheduler for the given period with default settings.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self::new(name, SweepConfig::every(period))
    }

    /// Waits until the next sweep is due.
    ///
    /// Pends forever when disabled or paused.
    pub async fn wait_for_sweep(&mut self) -> SweepInfo {
        let (next, period) = match (self.next_sweep, self.period) {
            (Some(next), Some(period)) if !self.paused => (next, period),
            _ => return std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.count += 1;
        self.sweep_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let skipped = u64::try_from(late_by.as_millis() / period.as_millis().max(1)).unwrap_or(u64::MAX);
        if skipped > 0 {
            warn!(
                sweep = self.name,
                skipped,
                late_ms = millis(late_by),
                "sweep loop running behind, skipping ahead"
            );
        }

        self.next_sweep = Some(now + period);
        self.metrics.total_sweeps += 1;
        self.metrics.total_skipped += skipped;

        trace!(sweep = self.name, count = self.count, "sweep due");
        SweepInfo { sweep: self.count, skipped }
    }

    /// Records that the current sweep finished.
    ///
    /// Call after the sweep body returns. Without it, budget warnings and
    /// timing metrics are not collected.
    pub fn record_sweep_end(&mut self) {
        let Some(start) = self.sweep_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        if let Some(period) = self.period {
            let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
            if utilization >= self.config.budget_warn_threshold {
                self.metrics.total_slow += 1;
                warn!(
                    sweep = self.name,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    period_ms = millis(period),
                    "sweep took a large share of its period"
                );
            }
        }

        self.metrics.max_sweep_time = self.metrics.max_sweep_time.max(elapsed);
        let alpha = 0.1;
        let prev = self.metrics.avg_sweep_time.as_secs_f64();
        self.metrics.avg_sweep_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    /// Stops sweeping until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(sweep = self.name, "sweep scheduler paused");
        }
    }

    /// Resumes after a pause. The next sweep is one full period from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(period) = self.period {
                self.next_sweep = Some(TokioInstant::now() + period);
            }
            debug!(sweep = self.name, "sweep scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn sweep_count(&self) -> u64 {
        self.count
    }

    pub fn metrics(&self) -> &SweepMetrics {
        &self.metrics
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates_past_u64() {
        assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
