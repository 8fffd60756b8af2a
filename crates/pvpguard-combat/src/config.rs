//! Combat timing and threshold configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Windows and thresholds shared by the combat components.
///
/// Durations are whole seconds so the config file stays readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// How long after the last hit a player counts as "in combat".
    pub combat_tag_secs: u64,

    /// How long a damage session may sit idle before it is flushed.
    pub session_timeout_secs: u64,

    /// A hit that leaves the victim at or below this health (and above
    /// zero) raises a low-HP alert.
    pub low_hp_threshold: f64,

    /// Minimum gap between two low-HP alerts for the same victim.
    pub low_hp_alert_cooldown_secs: u64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            combat_tag_secs: 15,
            session_timeout_secs: 30,
            low_hp_threshold: 5.0,
            low_hp_alert_cooldown_secs: 30,
        }
    }
}

impl CombatConfig {
    pub fn combat_tag(&self) -> Duration {
        Duration::from_secs(self.combat_tag_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn low_hp_alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.low_hp_alert_cooldown_secs)
    }

    /// Returns a copy with out-of-range values replaced.
    ///
    /// The tag and session windows are at least one second. A negative or
    /// NaN threshold falls back to the default.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        self.combat_tag_secs = self.combat_tag_secs.max(1);
        self.session_timeout_secs = self.session_timeout_secs.max(1);
        if !self.low_hp_threshold.is_finite() || self.low_hp_threshold < 0.0 {
            tracing::warn!(
                value = self.low_hp_threshold,
                "invalid low_hp_threshold, using default"
            );
            self.low_hp_threshold = defaults.low_hp_threshold;
        }
        self
    }
}
