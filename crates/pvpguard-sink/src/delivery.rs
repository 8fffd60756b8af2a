//! Ready-made delivery targets.

use std::sync::Mutex;

use pvpguard_protocol::{Codec, JsonCodec, Report, ReportKind};
use tokio::sync::mpsc;

use crate::{ReportDelivery, ReportingSink, SinkError};

/// Delivers a report by logging its JSON body at `info`.
///
/// Useful for local servers and the demo, where there is no backend to
/// post to but operators still want to see what would have been sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery {
    codec: JsonCodec,
}

impl LogDelivery {
    pub fn new() -> Self {
        Self { codec: JsonCodec::compact() }
    }
}

impl ReportDelivery for LogDelivery {
    async fn deliver(&self, report: &Report) -> Result<(), SinkError> {
        let bytes = self.codec.encode(report)?;
        let body = String::from_utf8_lossy(&bytes);
        tracing::info!(endpoint = report.kind().endpoint(), %body, "report");
        Ok(())
    }
}

/// Forwards reports into a bounded Tokio channel.
///
/// When the receiver falls behind, `deliver` waits for capacity, which is
/// exactly what the dispatcher's timeout is there to bound.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    tx: mpsc::Sender<Report>,
}

impl ChannelDelivery {
    /// Creates a delivery and the receiver it feeds.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Report>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ReportDelivery for ChannelDelivery {
    async fn deliver(&self, report: &Report) -> Result<(), SinkError> {
        self.tx
            .send(report.clone())
            .await
            .map_err(|_| SinkError::Unavailable("report receiver dropped".into()))
    }
}

/// A synchronous [`ReportingSink`] that keeps every report in memory.
///
/// Intended for tests and tools: nothing leaves the process.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything emitted so far, oldest first.
    pub fn reports(&self) -> Vec<Report> {
        self.lock().clone()
    }

    /// Removes and returns everything emitted so far.
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of reports of one kind.
    pub fn count(&self, kind: ReportKind) -> usize {
        self.lock().iter().filter(|r| r.kind() == kind).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Report>> {
        // A poisoned lock only means a test panicked mid-push; the Vec
        // itself is still valid.
        self.reports.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ReportingSink for MemorySink {
    fn emit(&self, report: Report) {
        self.lock().push(report);
    }
}
