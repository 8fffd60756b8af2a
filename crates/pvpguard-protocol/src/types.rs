//! Core identity, time, and display types.
//!
//! Everything here is plain data: cheap to copy or clone, serializable, and
//! free of any locking or scheduling concerns.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a player id can never be confused with a raw
/// counter or timestamp. `Ord` is derived because damage sessions are keyed
/// by the canonical ordering of their two participants.
///
/// `#[serde(transparent)]` keeps the JSON form a plain number: `PlayerId(42)`
/// is written as `42`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A point in time, in milliseconds since the Unix epoch.
///
/// The core never reads the system clock itself. Every operation takes the
/// current `Timestamp` as an argument, which keeps windows and cooldowns
/// deterministic in tests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch itself. Used as the "never" value for fresh records.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Builds a timestamp from raw milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Builds a timestamp from whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    /// Raw milliseconds since the epoch.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// `self + d`, saturating at `u64::MAX`.
    pub fn saturating_add(self, d: Duration) -> Self {
        let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(ms))
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ---------------------------------------------------------------------------
// PlayerStatus
// ---------------------------------------------------------------------------

/// A player's self-declared content status, shown next to their name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    #[default]
    None,
    Recording,
    Streaming,
}

impl PlayerStatus {
    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Recording => "recording",
            Self::Streaming => "streaming",
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "recording" => Ok(Self::Recording),
            "streaming" => Ok(Self::Streaming),
            other => Err(ProtocolError::InvalidValue(format!(
                "unknown status {other:?} (expected recording, streaming or none)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A position in the game world, attached to alerts and combat-log reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// ---------------------------------------------------------------------------
// Badge
// ---------------------------------------------------------------------------

/// The PvP light shown in the tab list and above the nametag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PvpIndicator {
    Off,
    On,
    /// Still attackable. `remaining_secs` is rounded up so a player never
    /// sees "0s" while they can still be hit.
    CoolingDown { remaining_secs: u64 },
}

/// Everything the presentation layer needs to re-render one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBadge {
    pub pvp: PvpIndicator,
    pub status: PlayerStatus,
}

impl PlayerBadge {
    /// Whether the badge marks the player as a legitimate PvP target.
    pub fn is_attackable(&self) -> bool {
        !matches!(self.pvp, PvpIndicator::Off)
    }
}
