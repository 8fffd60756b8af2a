//! Shared vocabulary for pvpguard.
//!
//! This crate defines the types every other layer speaks:
//!
//! - **Types** ([`PlayerId`], [`Timestamp`], [`PlayerStatus`], [`Location`],
//!   [`PlayerBadge`]): identity, time, and display state.
//! - **Reports** ([`Report`] and its payloads): the structured events sent
//!   to the moderation backend.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how reports and persisted
//!   records are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about maps, locks, or workers. It only
//! describes data.
//!
//! ```text
//! Host events → Core (consent, combat) → Report (this crate) → Sink
//! ```

mod codec;
mod error;
mod report;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use report::{
    AlertAttacker, AlertInitiator, AlertSession, AlertVictim, CombatLogReport,
    DamageEventRecord, DamageSessionReport, KillParticipant, LowHpAlertReport,
    PlayerRef, PvpKillReport, Report, ReportKind, SessionParticipant,
    StatusChange, StatusChangeReport,
};
pub use types::{
    Location, PlayerBadge, PlayerId, PlayerStatus, PvpIndicator, Timestamp,
};
