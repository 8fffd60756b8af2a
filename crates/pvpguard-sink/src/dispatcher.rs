//! Background report dispatch.
//!
//! [`ReportDispatcher`] is the bridge between the synchronous event thread
//! and the asynchronous backend. `emit` pushes onto an unbounded channel and
//! returns at once; a single Tokio task drains the channel and hands each
//! report to a [`ReportDelivery`] under a timeout.
//!
//! ```text
//! event thread ──emit──▶ [ mpsc ] ──▶ worker task ──deliver──▶ backend
//!                                        │
//!                                        └─ timeout / error → warn!, drop
//! ```
//!
//! Failed reports are never retried. A moderation backend that is down for
//! a minute loses a minute of reports, and the game keeps running.

use std::time::Duration;

use pvpguard_protocol::Report;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{ReportDelivery, ReportingSink, SinkError};

/// Configuration for the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a single delivery may take before it is abandoned.
    pub timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Counters returned by the worker when the dispatcher shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    pub timed_out: u64,
}

/// A [`ReportingSink`] that delivers on a background task.
///
/// Cloning is cheap (it clones the channel sender). The worker stops once
/// every clone has been dropped and the queue is drained; its
/// [`JoinHandle`] then resolves to the final [`DispatchStats`].
#[derive(Debug, Clone)]
pub struct ReportDispatcher {
    tx: mpsc::UnboundedSender<Report>,
}

impl ReportDispatcher {
    /// Spawns the delivery worker on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime (same as `tokio::spawn`).
    pub fn spawn<D: ReportDelivery>(
        delivery: D,
        config: DispatchConfig,
    ) -> (Self, JoinHandle<DispatchStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(delivery, rx, config.timeout()));
        (Self { tx }, handle)
    }

    /// Whether the worker is still accepting reports.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl ReportingSink for ReportDispatcher {
    fn emit(&self, report: Report) {
        let kind = report.kind();
        if self.tx.send(report).is_err() {
            tracing::warn!(%kind, "report dispatcher stopped, report dropped");
        }
    }
}

async fn run_worker<D: ReportDelivery>(
    delivery: D,
    mut rx: mpsc::UnboundedReceiver<Report>,
    timeout: Duration,
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    while let Some(report) = rx.recv().await {
        let kind = report.kind();
        let endpoint = kind.endpoint();

        match tokio::time::timeout(timeout, delivery.deliver(&report)).await {
            Ok(Ok(())) => {
                stats.delivered += 1;
                tracing::debug!(%kind, endpoint, "report delivered");
            }
            Ok(Err(e)) => {
                stats.failed += 1;
                tracing::warn!(%kind, endpoint, error = %e, "report delivery failed");
            }
            Err(_) => {
                stats.timed_out += 1;
                let e = SinkError::Timeout(timeout);
                tracing::warn!(%kind, endpoint, error = %e, "report delivery failed");
            }
        }
    }

    tracing::debug!(
        delivered = stats.delivered,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "report dispatcher stopped"
    );
    stats
}
