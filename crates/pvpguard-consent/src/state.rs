//! Consent state: the data that says whether a player may be attacked.
//!
//! Each player has exactly one [`PlayerConsentState`]. It records:
//! - WHETHER the player has opted in to PvP (`pvp_enabled`)
//! - WHEN a requested disable takes effect (`cooldown_end`)
//! - WHAT content status they display (`status`)
//! - WHO they are, for report payloads (`username`)

use std::fmt;
use std::time::Duration;

use pvpguard_protocol::{
    PlayerBadge, PlayerId, PlayerRef, PlayerStatus, PvpIndicator, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::ConsentRecord;

// ---------------------------------------------------------------------------
// ConsentConfig
// ---------------------------------------------------------------------------

/// Configuration for consent behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// How long a player stays attackable after asking to disable PvP.
    /// Default: 300 seconds.
    pub cooldown_secs: u64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self { cooldown_secs: 300 }
    }
}

impl ConsentConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

// ---------------------------------------------------------------------------
// ConsentPhase
// ---------------------------------------------------------------------------

/// Where a player is in the consent state machine.
///
/// ```text
///   Off ──(enable)──→ On ──(begin_disable)──→ CoolingDown ──(timeout)──→ Off
/// ```
///
/// There are no other edges. In particular a cooling-down player cannot
/// re-enable early, and an `Off` player has nothing to disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPhase {
    Off,
    On,
    /// Still attackable until `ends_at`.
    CoolingDown { ends_at: Timestamp },
}

impl ConsentPhase {
    /// `On` and `CoolingDown` both count as consenting.
    pub fn is_attackable(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl fmt::Display for ConsentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::On => f.write_str("on"),
            Self::CoolingDown { ends_at } => write!(f, "cooling down until {ends_at}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// The outcome of a successful consent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Off → On.
    Enabled,
    /// The command matched the current phase; nothing changed.
    Unchanged,
    /// On → CoolingDown.
    CooldownStarted { ends_at: Timestamp },
}

// ---------------------------------------------------------------------------
// PlayerConsentState
// ---------------------------------------------------------------------------

/// One player's consent state.
///
/// Invariant: `cooldown_end.is_some()` implies `pvp_enabled`. When the
/// cooldown expires both fields are cleared together.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConsentState {
    pub player_id: PlayerId,
    /// Display name, learned when the player joins.
    pub username: Option<String>,
    pub pvp_enabled: bool,
    pub cooldown_end: Option<Timestamp>,
    pub status: PlayerStatus,
    pub last_updated: Timestamp,
}

impl PlayerConsentState {
    /// The state of a player we have never seen: PvP off, no status.
    pub fn new(player_id: PlayerId, now: Timestamp) -> Self {
        Self {
            player_id,
            username: None,
            pvp_enabled: false,
            cooldown_end: None,
            status: PlayerStatus::None,
            last_updated: now,
        }
    }

    /// Rebuilds state from a persisted record.
    ///
    /// A record with a cooldown but PvP off breaks the invariant (most
    /// likely a hand edit); the stray cooldown is discarded.
    pub fn from_record(player_id: PlayerId, record: ConsentRecord) -> Self {
        let cooldown_end = if record.pvp_enabled { record.cooldown_end } else { None };
        if cooldown_end != record.cooldown_end {
            tracing::debug!(%player_id, "discarding cooldown on record with pvp disabled");
        }
        Self {
            player_id,
            username: record.username,
            pvp_enabled: record.pvp_enabled,
            cooldown_end,
            status: record.status,
            last_updated: record.last_updated,
        }
    }

    pub fn to_record(&self) -> ConsentRecord {
        ConsentRecord {
            username: self.username.clone(),
            pvp_enabled: self.pvp_enabled,
            cooldown_end: self.cooldown_end,
            status: self.status,
            last_updated: self.last_updated,
        }
    }

    pub fn phase(&self) -> ConsentPhase {
        match (self.pvp_enabled, self.cooldown_end) {
            (false, _) => ConsentPhase::Off,
            (true, None) => ConsentPhase::On,
            (true, Some(ends_at)) => ConsentPhase::CoolingDown { ends_at },
        }
    }

    /// Whether a pending cooldown has run out at `now`.
    pub fn cooldown_expired(&self, now: Timestamp) -> bool {
        self.pvp_enabled && self.cooldown_end.is_some_and(|end| end <= now)
    }

    /// A reference for report payloads.
    pub fn player_ref(&self) -> PlayerRef {
        PlayerRef { id: self.player_id, username: self.username.clone() }
    }

    /// What the presentation layer should show for this player at `now`.
    pub fn badge(&self, now: Timestamp) -> PlayerBadge {
        let pvp = match self.phase() {
            ConsentPhase::Off => PvpIndicator::Off,
            ConsentPhase::On => PvpIndicator::On,
            ConsentPhase::CoolingDown { ends_at } => {
                let left = ends_at.saturating_since(now);
                // Round up: a player with 200ms left still sees "1s".
                let remaining_secs =
                    u64::try_from(left.as_millis().div_ceil(1_000)).unwrap_or(u64::MAX);
                PvpIndicator::CoolingDown { remaining_secs }
            }
        };
        PlayerBadge { pvp, status: self.status }
    }
}
