//! Damage session aggregation and low-HP alerts.
//!
//! Individual hits are too noisy to report one by one. The aggregator
//! groups them into sessions per pair of players and reports a session
//! once it goes quiet, and only when it involved someone who had not
//! consented to PvP. Fights between two consenting players are their own
//! business and are never reported.
//!
//! # Lifecycle of a session
//!
//! ```text
//! first hit ──→ [open] ──more hits──→ [open] ──idle ≥ timeout──→ sweep
//!                                                                  │
//!                              any snapshot false? ──yes──→ pvp_damage_session
//!                                                  └─no───→ dropped
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pvpguard_consent::{PlayerConsentState, PlayerConsentStore};
use pvpguard_protocol::{
    AlertAttacker, AlertInitiator, AlertSession, AlertVictim, DamageEventRecord,
    DamageSessionReport, Location, LowHpAlertReport, PlayerId, PlayerRef, Report,
    SessionParticipant, Timestamp,
};
use pvpguard_sink::ReportingSink;

use crate::session::{SessionCell, SessionKey, SessionView, Timeline};
use crate::CombatConfig;

/// One damage event as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub attacker: PlayerId,
    pub victim: PlayerId,
    pub damage: f64,
    /// The victim's health after this hit was applied.
    pub victim_health_after: f64,
    pub at: Timestamp,
    pub victim_location: Option<Location>,
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Sessions reported to the sink.
    pub flushed: usize,
    /// Sessions removed without a report (both players consented).
    pub dropped: usize,
}

impl SweepOutcome {
    pub fn total(&self) -> usize {
        self.flushed + self.dropped
    }
}

/// Groups hits into pairwise sessions and reports the non-consensual ones.
///
/// `record_damage` runs on the event thread and never blocks on anything
/// but a session's own short timeline lock. Sweeps may run concurrently on
/// a worker thread.
pub struct DamageSessionAggregator {
    sessions: DashMap<SessionKey, Arc<SessionCell>>,
    /// Last low-HP alert per victim.
    low_hp_alerts: DashMap<PlayerId, Timestamp>,
    consent: Arc<PlayerConsentStore>,
    sink: Arc<dyn ReportingSink>,
    config: CombatConfig,
}

impl DamageSessionAggregator {
    pub fn new(
        config: CombatConfig,
        consent: Arc<PlayerConsentStore>,
        sink: Arc<dyn ReportingSink>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            low_hp_alerts: DashMap::new(),
            consent,
            sink,
            config,
        }
    }

    /// Number of open sessions.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// A copy of the session between `a` and `b`, if one is open.
    pub fn session(&self, a: PlayerId, b: PlayerId) -> Option<SessionView> {
        let cell = self.sessions.get(&SessionKey::new(a, b))?.clone();
        Some(SessionView::of(&cell))
    }

    /// Records one hit. Returns `false` if the hit was ignored.
    ///
    /// Self-inflicted damage (fall damage, own potions) is ignored.
    pub fn record_damage(&self, hit: Hit) -> bool {
        if hit.attacker == hit.victim {
            tracing::debug!(player_id = %hit.attacker, "ignoring self damage");
            return false;
        }

        // Consent may have to be read from the record store; no session lock
        // is held yet.
        let attacker = self.consent.get_state(hit.attacker, hit.at);
        let victim = self.consent.get_state(hit.victim, hit.at);

        let key = SessionKey::new(hit.attacker, hit.victim);
        let alert = loop {
            let cell = self
                .sessions
                .entry(key)
                .or_insert_with(|| {
                    tracing::debug!(session = %key, "damage session opened");
                    Arc::new(SessionCell::new(key, hit.at))
                })
                .clone();

            // The map guard is gone; only the timeline lock is held below.
            if let Some(alert) = self.append(&cell, &hit, &attacker, &victim) {
                break alert;
            }
            tracing::debug!(session = %key, "session closed under us, retrying");
        };

        if let Some(report) = alert {
            self.maybe_alert(hit.victim, hit.at, report);
        }
        true
    }

    /// Appends `hit` to the session. Returns `None` if the session was
    /// closed by a sweep, otherwise the low-HP alert the hit raised (if any).
    fn append(
        &self,
        cell: &SessionCell,
        hit: &Hit,
        attacker: &PlayerConsentState,
        victim: &PlayerConsentState,
    ) -> Option<Option<LowHpAlertReport>> {
        let mut timeline = cell.timeline();
        if timeline.closed {
            return None;
        }

        if timeline.events.is_empty() {
            timeline.initiator = Some(hit.attacker);
            timeline.start = hit.at;
            timeline.last_damage = hit.at;
        }

        for state in [attacker, victim] {
            if let Some(slot) = cell.key.slot(state.player_id) {
                cell.snapshots[slot].capture_with(|| state.pvp_enabled);
            }
        }

        timeline.events.push(DamageEventRecord {
            timestamp: hit.at,
            attacker: hit.attacker,
            victim: hit.victim,
            damage: hit.damage,
            victim_health_after: hit.victim_health_after,
        });
        timeline.last_damage = timeline.last_damage.max(hit.at);

        let low = hit.victim_health_after > 0.0
            && hit.victim_health_after <= self.config.low_hp_threshold;
        Some(low.then(|| self.build_alert(&timeline, hit, attacker, victim)))
    }

    fn build_alert(
        &self,
        timeline: &Timeline,
        hit: &Hit,
        attacker: &PlayerConsentState,
        victim: &PlayerConsentState,
    ) -> LowHpAlertReport {
        let initiator_id = timeline.initiator.unwrap_or(hit.attacker);
        let initiator = if initiator_id == hit.attacker { attacker.player_ref() } else { victim.player_ref() };
        let (dealt, _) = timeline.dealt_by(hit.attacker);

        LowHpAlertReport {
            timestamp: hit.at,
            health_remaining: hit.victim_health_after,
            threshold: self.config.low_hp_threshold,
            session: AlertSession {
                duration_ms: duration_ms(timeline.duration()),
                total_hits: timeline.events.len(),
                total_damage: timeline.total_damage(),
                consensual: attacker.pvp_enabled && victim.pvp_enabled,
            },
            victim: AlertVictim {
                player: victim.player_ref(),
                pvp_enabled: victim.pvp_enabled,
                health: hit.victim_health_after,
            },
            attacker: AlertAttacker {
                player: attacker.player_ref(),
                pvp_enabled: attacker.pvp_enabled,
                total_damage_dealt: dealt,
            },
            initiator: AlertInitiator {
                player: initiator,
                is_current_attacker: initiator_id == hit.attacker,
            },
            location: hit.victim_location.clone(),
        }
    }

    fn maybe_alert(&self, victim: PlayerId, now: Timestamp, report: LowHpAlertReport) {
        let cooldown = self.config.low_hp_alert_cooldown();
        let mut suppressed = false;

        self.low_hp_alerts
            .entry(victim)
            .and_modify(|last| {
                if now.saturating_since(*last) < cooldown {
                    suppressed = true;
                } else {
                    *last = now;
                }
            })
            .or_insert(now);

        if suppressed {
            tracing::debug!(player_id = %victim, "low hp alert suppressed by cooldown");
            return;
        }

        tracing::info!(
            player_id = %victim,
            health = report.health_remaining,
            attacker = %report.attacker.player.id,
            "low hp alert"
        );
        self.sink.emit(Report::LowHpAlert(report));
    }

    /// Flushes every session idle for at least the session timeout.
    ///
    /// Also purges low-HP cooldown entries that have run out.
    pub fn sweep_expired_sessions(&self, now: Timestamp) -> SweepOutcome {
        let timeout = self.config.session_timeout();

        let idle: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().timeline().is_idle(now, timeout))
            .map(|entry| *entry.key())
            .collect();

        let mut outcome = SweepOutcome::default();
        for key in idle {
            // Re-checked under the map entry and timeline locks: a hit may
            // have landed since the scan.
            if let Some((_, cell)) =
                self.sessions.remove_if(&key, |_, cell| cell.close_if_idle(now, timeout))
            {
                self.flush(&cell, &mut outcome);
            }
        }

        let cooldown = self.config.low_hp_alert_cooldown();
        self.low_hp_alerts.retain(|_, last| now.saturating_since(*last) < cooldown);

        if outcome.total() > 0 {
            tracing::debug!(flushed = outcome.flushed, dropped = outcome.dropped, "session sweep");
        }
        outcome
    }

    /// Flushes every open session regardless of age. Used at shutdown.
    pub fn flush_all(&self, now: Timestamp) -> SweepOutcome {
        let keys: Vec<SessionKey> = self.sessions.iter().map(|e| *e.key()).collect();

        let mut outcome = SweepOutcome::default();
        for key in keys {
            if let Some((_, cell)) = self.sessions.remove(&key) {
                cell.close();
                self.flush(&cell, &mut outcome);
            }
        }

        tracing::info!(
            flushed = outcome.flushed,
            dropped = outcome.dropped,
            at = %now,
            "all damage sessions flushed"
        );
        outcome
    }

    fn flush(&self, cell: &SessionCell, outcome: &mut SweepOutcome) {
        let key = cell.key;
        let [low_consent, high_consent] = cell.consent();

        if low_consent && high_consent {
            tracing::debug!(session = %key, "consensual session dropped");
            outcome.dropped += 1;
            return;
        }

        let (empty, now) = {
            let timeline = cell.timeline();
            (timeline.events.is_empty(), timeline.last_damage)
        };
        if empty {
            outcome.dropped += 1;
            return;
        }

        // The cell is closed, so the timeline cannot change while unlocked.
        let low = self.player_ref(key.low(), now);
        let high = self.player_ref(key.high(), now);

        let timeline = cell.timeline();
        let participant = |player: PlayerRef, pvp_enabled: bool| {
            let (damage_dealt, hits_dealt) = timeline.dealt_by(player.id);
            SessionParticipant { player, pvp_enabled, damage_dealt, hits_dealt }
        };

        let report = DamageSessionReport {
            timestamp: timeline.start,
            duration_ms: duration_ms(timeline.duration()),
            total_hits: timeline.events.len(),
            total_damage: timeline.total_damage(),
            initiator: timeline
                .initiator
                .map(|id| if id == key.low() { low.clone() } else { high.clone() }),
            player1: participant(low, low_consent),
            player2: participant(high, high_consent),
            damage_events: timeline.events.clone(),
        };
        drop(timeline);

        tracing::info!(
            session = %key,
            hits = report.total_hits,
            damage = report.total_damage,
            "damage session reported"
        );
        outcome.flushed += 1;
        self.sink.emit(Report::PvpDamageSession(report));
    }

    fn player_ref(&self, id: PlayerId, now: Timestamp) -> PlayerRef {
        self.consent.get_state(id, now).player_ref()
    }
}

impl std::fmt::Debug for DamageSessionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DamageSessionAggregator")
            .field("open_sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
