use std::time::Duration;

use pvpguard_protocol::ProtocolError;

/// Errors that can occur while delivering a report.
///
/// None of these are fatal. The dispatcher logs them and moves on to the
/// next report.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The backend did not answer within the configured timeout.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a non-success status.
    #[error("backend rejected report with status {0}")]
    Rejected(u16),

    /// The backend (or the channel standing in for it) is gone.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The report could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),
}
