//! Player PvP consent for pvpguard.
//!
//! This crate answers one question for the rest of the system: "may this
//! player be attacked right now?" It handles:
//!
//! 1. **State**: each player's consent phase and content status
//!    ([`PlayerConsentState`], [`ConsentPhase`])
//! 2. **Transitions**: enable, disable-with-cooldown, cooldown expiry
//!    ([`PlayerConsentStore`])
//! 3. **Persistence**: one record per player, saved on every change
//!    ([`RecordStore`], [`RecordWriter`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Combat Layer (above)  ← reads consent to tag players and snapshot sessions
//!     ↕
//! Consent Layer (this crate)  ← owns the consent state machine
//!     ↕
//! Protocol Layer (below)  ← provides PlayerId, Timestamp, PlayerStatus
//! ```

mod error;
mod record;
mod state;
mod store;

pub use error::{ConsentError, StoreError};
pub use record::{
    ConsentRecord, JsonFileRecordStore, MemoryRecordStore, RecordStore, RecordWriter, WriteOp,
};
pub use state::{ConsentConfig, ConsentPhase, PlayerConsentState, Transition};
pub use store::PlayerConsentStore;
