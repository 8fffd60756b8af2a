//! Error types for the consent layer.

use pvpguard_protocol::{PlayerId, ProtocolError};

use crate::ConsentPhase;

/// Errors returned by consent commands.
///
/// These are user-facing and never fatal: the caller turns them into a
/// chat message and nothing else changes.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    /// The requested transition is not allowed from the player's current
    /// phase, e.g. enabling while a disable cooldown is running.
    #[error("cannot {action} PvP for {player} while {phase}")]
    InvalidTransition {
        player: PlayerId,
        phase: ConsentPhase,
        action: &'static str,
    },
}

/// Errors from a [`RecordStore`](crate::RecordStore).
///
/// The consent store logs these and keeps going; in-memory state is always
/// authoritative over what made it to disk.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding failed: {0}")]
    Codec(#[from] ProtocolError),

    /// The backing store refused the operation (used by in-memory stores
    /// to simulate a full disk).
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}
