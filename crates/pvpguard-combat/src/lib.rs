//! Combat tracking for pvpguard.
//!
//! Everything here reacts to damage, deaths, and disconnects:
//!
//! - [`CombatTagTracker`]: who was in a consensual fight a moment ago
//! - [`DamageSessionAggregator`]: groups hits per pair of players and
//!   reports fights that involved a non-consenting player
//! - [`CombatEvasionDetector`]: punishes disconnecting mid-fight
//! - [`CombatConfig`]: windows and thresholds for all of the above
//!
//! All three components are `Send + Sync` and take `&self`. Hosts call
//! them from one event thread while sweeps run on Tokio workers.

mod aggregator;
mod config;
mod evasion;
mod session;
mod tag;

pub use aggregator::{DamageSessionAggregator, Hit, SweepOutcome};
pub use config::CombatConfig;
pub use evasion::{CombatEvasionDetector, EvasionVerdict};
pub use session::{ConsentSnapshot, SessionKey, SessionView};
pub use tag::CombatTagTracker;
