//! Combat-log detection: punishing players who disconnect mid-fight.

use std::sync::Arc;

use pvpguard_consent::PlayerConsentStore;
use pvpguard_protocol::{CombatLogReport, Location, PlayerId, Report, Timestamp};
use pvpguard_sink::{Messaging, ReportingSink, WorldMutation};

use crate::CombatTagTracker;

/// What happened when a player disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvasionVerdict {
    /// The player had PvP off, so there was no fight to evade.
    ConsentOff,
    /// PvP on, but no recent combat.
    NotInCombat,
    /// Killed, reported, and messaged.
    Punished,
}

/// Decides whether a disconnect was an attempt to escape a fight.
pub struct CombatEvasionDetector {
    consent: Arc<PlayerConsentStore>,
    tags: Arc<CombatTagTracker>,
    sink: Arc<dyn ReportingSink>,
    world: Arc<dyn WorldMutation>,
    messaging: Arc<dyn Messaging>,
    /// Sent to the player after punishment; shown on their next login.
    message: String,
}

impl CombatEvasionDetector {
    pub fn new(
        consent: Arc<PlayerConsentStore>,
        tags: Arc<CombatTagTracker>,
        sink: Arc<dyn ReportingSink>,
        world: Arc<dyn WorldMutation>,
        messaging: Arc<dyn Messaging>,
        message: impl Into<String>,
    ) -> Self {
        Self { consent, tags, sink, world, messaging, message: message.into() }
    }

    /// Handles a disconnect.
    ///
    /// A player who disconnects with PvP enabled while tagged is killed,
    /// reported as `combat_log`, and told why. The tag is claimed before
    /// anything else happens, so a death landing at the same moment either
    /// wins outright (the player is not punished) or loses outright (the
    /// punishment runs once).
    pub fn on_disconnect(
        &self,
        id: PlayerId,
        now: Timestamp,
        location: Option<Location>,
    ) -> EvasionVerdict {
        let state = self.consent.get_state(id, now);
        if !state.pvp_enabled {
            return EvasionVerdict::ConsentOff;
        }

        let Some(age) = self.tags.tag_age(id, now) else {
            return EvasionVerdict::NotInCombat;
        };
        if !self.tags.clear(id) {
            // A death or another disconnect handler got there first.
            return EvasionVerdict::NotInCombat;
        }

        let tag_age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(player_id = %id, tag_age_ms, "combat log detected");

        self.world.kill(id);
        self.sink.emit(Report::CombatLog(CombatLogReport {
            timestamp: now,
            player: state.player_ref(),
            status: state.status,
            location,
            tag_age_ms,
        }));
        self.messaging.notify(id, &self.message);

        EvasionVerdict::Punished
    }

    /// Handles a death. Clears the tag; returns whether there was one.
    pub fn on_death(&self, id: PlayerId) -> bool {
        self.tags.clear(id)
    }
}

impl std::fmt::Debug for CombatEvasionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatEvasionDetector").field("message", &self.message).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use pvpguard_protocol::ReportKind;
    use pvpguard_sink::MemorySink;

    #[derive(Default)]
    struct World {
        killed: Mutex<Vec<PlayerId>>,
        told: Mutex<Vec<(PlayerId, String)>>,
    }

    impl WorldMutation for World {
        fn kill(&self, player: PlayerId) {
            self.killed.lock().unwrap().push(player);
        }
    }

    impl Messaging for World {
        fn notify(&self, player: PlayerId, text: &str) {
            self.told.lock().unwrap().push((player, text.to_owned()));
        }
    }

    struct Fixture {
        consent: Arc<PlayerConsentStore>,
        tags: Arc<CombatTagTracker>,
        sink: Arc<MemorySink>,
        world: Arc<World>,
        detector: CombatEvasionDetector,
    }

    fn fixture() -> Fixture {
        let consent = Arc::new(PlayerConsentStore::in_memory());
        let tags = Arc::new(CombatTagTracker::new(Duration::from_secs(15)));
        let sink = Arc::new(MemorySink::new());
        let world = Arc::new(World::default());
        let detector = CombatEvasionDetector::new(
            Arc::clone(&consent),
            Arc::clone(&tags),
            sink.clone(),
            world.clone(),
            world.clone(),
            "You were killed for combat logging.",
        );
        Fixture { consent, tags, sink, world, detector }
    }

    #[test]
    fn test_on_disconnect_consent_off_is_ignored() {
        let f = fixture();
        f.tags.tag(PlayerId(1), Timestamp(0));

        let verdict = f.detector.on_disconnect(PlayerId(1), Timestamp(1_000), None);

        assert_eq!(verdict, EvasionVerdict::ConsentOff);
        assert!(f.world.killed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_on_disconnect_tagged_player_is_punished_once() {
        let f = fixture();
        f.consent.enable(PlayerId(1), Timestamp(0)).unwrap();
        f.consent.set_status(PlayerId(1), pvpguard_protocol::PlayerStatus::Streaming, Timestamp(0));
        f.tags.tag(PlayerId(1), Timestamp(0));

        let location = Location { world: "overworld".into(), x: 1.0, y: 64.0, z: -3.0 };
        let verdict = f.detector.on_disconnect(PlayerId(1), Timestamp(14_000), Some(location.clone()));

        assert_eq!(verdict, EvasionVerdict::Punished);
        assert_eq!(*f.world.killed.lock().unwrap(), vec![PlayerId(1)]);
        assert_eq!(f.world.told.lock().unwrap().len(), 1);
        assert!(!f.tags.is_tagged(PlayerId(1), Timestamp(14_000)));

        let reports = f.sink.take();
        assert_eq!(reports.len(), 1);
        let Report::CombatLog(report) = &reports[0] else {
            panic!("expected a combat log report");
        };
        assert_eq!(report.tag_age_ms, 14_000);
        assert_eq!(report.location, Some(location));
        assert_eq!(report.status, pvpguard_protocol::PlayerStatus::Streaming);

        // Reconnect and disconnect again: the tag is gone.
        let again = f.detector.on_disconnect(PlayerId(1), Timestamp(14_500), None);
        assert_eq!(again, EvasionVerdict::NotInCombat);
    }

    #[test]
    fn test_on_disconnect_after_tag_window_is_not_punished() {
        let f = fixture();
        f.consent.enable(PlayerId(1), Timestamp(0)).unwrap();
        f.tags.tag(PlayerId(1), Timestamp(0));

        let verdict = f.detector.on_disconnect(PlayerId(1), Timestamp(15_000), None);

        assert_eq!(verdict, EvasionVerdict::NotInCombat);
        assert_eq!(f.sink.count(ReportKind::CombatLog), 0);
        assert!(f.world.killed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_on_death_clears_tag_before_disconnect() {
        let f = fixture();
        f.consent.enable(PlayerId(1), Timestamp(0)).unwrap();
        f.tags.tag(PlayerId(1), Timestamp(0));

        assert!(f.detector.on_death(PlayerId(1)));
        assert!(!f.detector.on_death(PlayerId(1)));

        let verdict = f.detector.on_disconnect(PlayerId(1), Timestamp(1_000), None);
        assert_eq!(verdict, EvasionVerdict::NotInCombat);
    }
}
