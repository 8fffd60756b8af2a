//! Unified error type for pvpguard.

use pvpguard_consent::{ConsentError, StoreError};
use pvpguard_protocol::ProtocolError;
use pvpguard_sink::SinkError;

/// Top-level error that wraps all crate-specific errors.
///
/// Hosts using the `pvpguard` facade deal with this single type. The
/// `#[from]` attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PvpGuardError {
    /// Encoding or decoding a report or record failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Delivering a report failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A consent command was not allowed (user-facing, non-fatal).
    #[error(transparent)]
    Consent(#[from] ConsentError),

    /// The record store could not be opened or read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration could not be parsed or is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}
