//! Top-level configuration.
//!
//! Every section has a `Default` and `#[serde(default)]`, so a config file
//! only needs the keys it wants to change:
//!
//! ```json
//! {
//!   "consent": { "cooldown_secs": 120 },
//!   "combat": { "combat_tag_secs": 20 },
//!   "data_dir": "plugins/pvpguard/players"
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use pvpguard_combat::CombatConfig;
use pvpguard_consent::ConsentConfig;
use pvpguard_sink::DispatchConfig;
use pvpguard_sweep::SweepConfig;
use serde::{Deserialize, Serialize};

use crate::PvpGuardError;

/// Everything a [`PvpGuard`](crate::PvpGuard) needs to know.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub consent: ConsentConfig,
    pub combat: CombatConfig,
    pub sweeps: SweepIntervals,
    pub dispatch: DispatchConfig,
    pub messages: Messages,
    /// Directory for per-player consent records. `None` keeps records in
    /// memory only.
    pub data_dir: Option<PathBuf>,
}

impl GuardConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    /// [`PvpGuardError::Config`] if the document is not valid JSON or a
    /// field has the wrong type. Missing fields are not an error.
    pub fn from_json_str(json: &str) -> Result<Self, PvpGuardError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PvpGuardError::Config(e.to_string()))?;
        Ok(config.validated())
    }

    /// Returns a copy with out-of-range values clamped.
    pub fn validated(mut self) -> Self {
        self.combat = self.combat.validated();
        self.sweeps.cooldowns = self.sweeps.cooldowns.validated();
        self.sweeps.sessions = self.sweeps.sessions.validated();
        self
    }
}

/// How often each background sweep runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepIntervals {
    /// Expired consent cooldowns and combat tags.
    pub cooldowns: SweepConfig,
    /// Idle damage sessions and low-HP alert cooldowns.
    pub sessions: SweepConfig,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            cooldowns: SweepConfig::every(Duration::from_secs(1)),
            sessions: SweepConfig::every(Duration::from_secs(5)),
        }
    }
}

/// Chat messages sent to players.
///
/// `{seconds}` is replaced with the relevant number of seconds where one
/// applies (cooldown length, time left, or combat tag length).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub pvp_enabled: String,
    pub pvp_already_on: String,
    pub pvp_cooldown_started: String,
    pub pvp_cooling_down: String,
    pub pvp_already_off: String,
    /// Sent when a cooldown finishes and PvP is actually off.
    pub pvp_disabled: String,
    pub status_changed: String,
    pub combat_log: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            pvp_enabled: "PvP enabled. Players with PvP on can now attack you.".into(),
            pvp_already_on: "PvP is already on.".into(),
            pvp_cooldown_started:
                "PvP will turn off in {seconds} seconds. You can still be attacked until then.".into(),
            pvp_cooling_down: "PvP is already turning off ({seconds}s left).".into(),
            pvp_already_off: "PvP is already off.".into(),
            pvp_disabled: "PvP is now off. You can no longer be attacked.".into(),
            status_changed: "Status updated.".into(),
            combat_log: "You were killed for logging out during combat with PvP enabled. \
                         Wait {seconds} seconds after combat before logging out, or turn PvP off first."
                .into(),
        }
    }
}

impl Messages {
    /// Fills `{seconds}` in a template.
    pub fn render(template: &str, seconds: u64) -> String {
        template.replace("{seconds}", &seconds.to_string())
    }
}
