//! Report payloads sent to the moderation backend.
//!
//! Every structured event the core produces is one variant of [`Report`].
//! The enum is internally tagged, so each JSON document carries a `"type"`
//! field the backend routes on:
//!
//! ```json
//! { "type": "combat_log", "timestamp": 1700000000000, "player": { ... } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Location, PlayerId, PlayerStatus, Timestamp};

// ---------------------------------------------------------------------------
// ReportKind
// ---------------------------------------------------------------------------

/// The five kinds of report, without their payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    PvpDamageSession,
    LowHpAlert,
    CombatLog,
    PvpKill,
    StatusChange,
}

impl ReportKind {
    /// The wire name, identical to the `"type"` tag of the payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PvpDamageSession => "pvp_damage_session",
            Self::LowHpAlert => "low_hp_alert",
            Self::CombatLog => "combat_log",
            Self::PvpKill => "pvp_kill",
            Self::StatusChange => "status_change",
        }
    }

    /// The backend route this kind of report is posted to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::PvpDamageSession => "pvp/damage-session",
            Self::LowHpAlert => "pvp/low-hp",
            Self::CombatLog => "pvp/combat-log",
            Self::PvpKill => "pvp/kill",
            Self::StatusChange => "pvp/log",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A structured event for the reporting sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Report {
    PvpDamageSession(DamageSessionReport),
    LowHpAlert(LowHpAlertReport),
    CombatLog(CombatLogReport),
    PvpKill(PvpKillReport),
    StatusChange(StatusChangeReport),
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Self::PvpDamageSession(_) => ReportKind::PvpDamageSession,
            Self::LowHpAlert(_) => ReportKind::LowHpAlert,
            Self::CombatLog(_) => ReportKind::CombatLog,
            Self::PvpKill(_) => ReportKind::PvpKill,
            Self::StatusChange(_) => ReportKind::StatusChange,
        }
    }

    /// When the reported thing happened (session start for sessions).
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::PvpDamageSession(r) => r.timestamp,
            Self::LowHpAlert(r) => r.timestamp,
            Self::CombatLog(r) => r.timestamp,
            Self::PvpKill(r) => r.timestamp,
            Self::StatusChange(r) => r.timestamp,
        }
    }
}

/// A player reference as it appears in payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: PlayerId,
    /// Display name, if the player has joined since the record was created.
    pub username: Option<String>,
}

// ---------------------------------------------------------------------------
// pvp_damage_session
// ---------------------------------------------------------------------------

/// A flushed damage session between two players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageSessionReport {
    /// Session start (first hit).
    pub timestamp: Timestamp,
    pub duration_ms: u64,
    pub total_hits: usize,
    pub total_damage: f64,
    /// Who landed the first hit.
    pub initiator: Option<PlayerRef>,
    /// The participant with the smaller id.
    pub player1: SessionParticipant,
    /// The participant with the larger id.
    pub player2: SessionParticipant,
    pub damage_events: Vec<DamageEventRecord>,
}

impl DamageSessionReport {
    /// `true` if both participants had consented when they entered the fight.
    pub fn consensual(&self) -> bool {
        self.player1.pvp_enabled && self.player2.pvp_enabled
    }
}

/// One side of a damage session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParticipant {
    #[serde(flatten)]
    pub player: PlayerRef,
    /// Consent as captured on this participant's first event in the session.
    pub pvp_enabled: bool,
    pub damage_dealt: f64,
    pub hits_dealt: usize,
}

/// One hit inside a damage session timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageEventRecord {
    pub timestamp: Timestamp,
    pub attacker: PlayerId,
    pub victim: PlayerId,
    pub damage: f64,
    pub victim_health_after: f64,
}

// ---------------------------------------------------------------------------
// low_hp_alert
// ---------------------------------------------------------------------------

/// Raised when a hit leaves its victim at or under the low-HP threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowHpAlertReport {
    pub timestamp: Timestamp,
    pub health_remaining: f64,
    pub threshold: f64,
    pub victim: AlertVictim,
    pub attacker: AlertAttacker,
    pub initiator: AlertInitiator,
    pub session: AlertSession,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertVictim {
    #[serde(flatten)]
    pub player: PlayerRef,
    pub pvp_enabled: bool,
    pub health: f64,
}

/// The player whose hit dropped the victim low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAttacker {
    #[serde(flatten)]
    pub player: PlayerRef,
    pub pvp_enabled: bool,
    /// Damage this attacker dealt to this victim in the current session.
    pub total_damage_dealt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInitiator {
    #[serde(flatten)]
    pub player: PlayerRef,
    pub is_current_attacker: bool,
}

/// Session aggregates at the moment of the alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSession {
    pub duration_ms: u64,
    pub total_hits: usize,
    pub total_damage: f64,
    pub consensual: bool,
}

// ---------------------------------------------------------------------------
// combat_log
// ---------------------------------------------------------------------------

/// A player disconnected while tagged with PvP enabled and was killed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatLogReport {
    pub timestamp: Timestamp,
    pub player: PlayerRef,
    pub status: PlayerStatus,
    pub location: Option<Location>,
    /// How long before the disconnect the player was last tagged.
    pub tag_age_ms: u64,
}

// ---------------------------------------------------------------------------
// pvp_kill
// ---------------------------------------------------------------------------

/// One player killed another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvpKillReport {
    pub timestamp: Timestamp,
    pub consensual: bool,
    pub killer: KillParticipant,
    pub victim: KillParticipant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillParticipant {
    #[serde(flatten)]
    pub player: PlayerRef,
    pub pvp_enabled: bool,
    pub status: PlayerStatus,
}

// ---------------------------------------------------------------------------
// status_change
// ---------------------------------------------------------------------------

/// A player's consent or content status changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeReport {
    pub timestamp: Timestamp,
    pub player: PlayerRef,
    pub change: StatusChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusChange {
    PvpEnabled,
    /// Disable requested; still attackable until `ends_at`.
    CooldownStarted { ends_at: Timestamp },
    /// Cooldown elapsed; PvP is now off.
    PvpDisabled,
    Status { status: PlayerStatus },
}
