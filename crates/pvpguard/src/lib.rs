//! # pvpguard
//!
//! Opt-in PvP consent enforcement for shared multiplayer worlds.
//!
//! Players toggle PvP on for themselves; turning it off takes effect only
//! after a cooldown. Fights that involve someone who did not consent are
//! reported, and players who disconnect mid-fight are punished. The host
//! game server feeds in events and implements a handful of small traits
//! for everything outward-facing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pvpguard::prelude::*;
//!
//! # async fn run() -> Result<(), PvpGuardError> {
//! let config = GuardConfig::default();
//! let (dispatcher, _delivery) = ReportDispatcher::spawn(LogDelivery::new(), config.dispatch.clone());
//! let guard = PvpGuard::builder().config(config).sink(dispatcher).build()?;
//! let workers = guard.spawn_workers();
//!
//! // Host callbacks:
//! guard.join(PlayerId(7), "ash", guard.now());
//! guard.consent_command(PlayerId(7), ConsentCommand::On, guard.now())?;
//!
//! workers.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod error;
mod events;
mod guard;
pub mod telemetry;
mod workers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GuardConfig, Messages, SweepIntervals};
pub use error::PvpGuardError;
pub use events::{ConsentCommand, DamageEvent, EventDispatcher, HostEvent, HostEventHandler};
pub use guard::{PvpGuard, PvpGuardBuilder};
pub use workers::GuardWorkers;

// Re-export the sub-crates for hosts that need the lower layers directly.
pub use pvpguard_combat as combat;
pub use pvpguard_consent as consent;
pub use pvpguard_protocol as protocol;
pub use pvpguard_sink as sink;
pub use pvpguard_sweep as sweep;

/// Everything a host typically needs.
pub mod prelude {
    pub use crate::{
        Clock, ConsentCommand, DamageEvent, EventDispatcher, GuardConfig, GuardWorkers, HostEvent,
        HostEventHandler, ManualClock, PvpGuard, PvpGuardError, SystemClock,
    };
    pub use pvpguard_combat::{EvasionVerdict, SweepOutcome};
    pub use pvpguard_consent::{ConsentPhase, Transition};
    pub use pvpguard_protocol::{
        Location, PlayerBadge, PlayerId, PlayerStatus, PvpIndicator, Report, ReportKind, Timestamp,
    };
    pub use pvpguard_sink::{
        ChannelDelivery, Discard, LogDelivery, MemorySink, Messaging, PresentationUpdate,
        ReportDispatcher, ReportingSink, WorldMutation,
    };
}
