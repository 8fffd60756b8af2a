//! End-to-end tests for the `PvpGuard` facade.
//!
//! Collaborators are in-memory recorders and time comes from a
//! `ManualClock`, so every test drives the whole system deterministically.
//! Async tests start with Tokio's clock paused; cooldown hints and sweep
//! loops fire as soon as the test task sleeps past them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pvpguard::prelude::*;
use pvpguard::consent::{ConsentRecord, MemoryRecordStore, RecordStore, StoreError};
use pvpguard::protocol::StatusChange;
use pvpguard::sweep::SweepConfig;

// =========================================================================
// Helpers
// =========================================================================

const A: PlayerId = PlayerId(1);
const B: PlayerId = PlayerId(2);

#[derive(Default)]
struct Host {
    badges: Mutex<Vec<(PlayerId, PlayerBadge)>>,
    killed: Mutex<Vec<PlayerId>>,
    told: Mutex<Vec<(PlayerId, String)>>,
}

impl Host {
    fn told(&self, player: PlayerId) -> Vec<String> {
        self.told
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn last_badge(&self, player: PlayerId) -> Option<PlayerBadge> {
        self.badges.lock().unwrap().iter().rev().find(|(p, _)| *p == player).map(|(_, b)| *b)
    }
}

impl PresentationUpdate for Host {
    fn refresh(&self, player: PlayerId, badge: &PlayerBadge) {
        self.badges.lock().unwrap().push((player, *badge));
    }
}

impl WorldMutation for Host {
    fn kill(&self, player: PlayerId) {
        self.killed.lock().unwrap().push(player);
    }
}

impl Messaging for Host {
    fn notify(&self, player: PlayerId, text: &str) {
        self.told.lock().unwrap().push((player, text.to_owned()));
    }
}

struct Fixture {
    guard: PvpGuard,
    sink: Arc<MemorySink>,
    host: Arc<Host>,
    clock: Arc<ManualClock>,
}

/// Five-second cooldown so tests stay readable; everything else default.
fn config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.consent.cooldown_secs = 5;
    config.sweeps.cooldowns = SweepConfig { period_ms: 1_000, initial_jitter_ms: 0, ..SweepConfig::default() };
    config.sweeps.sessions = SweepConfig { period_ms: 1_000, initial_jitter_ms: 0, ..SweepConfig::default() };
    config
}

fn fixture_with(config: GuardConfig, records: Arc<MemoryRecordStore>) -> Fixture {
    let sink = Arc::new(MemorySink::new());
    let host = Arc::new(Host::default());
    let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
    let guard = PvpGuard::builder()
        .config(config)
        .clock(clock.clone())
        .sink(Arc::clone(&sink))
        .presentation(Arc::clone(&host))
        .world(Arc::clone(&host))
        .messaging(Arc::clone(&host))
        .record_store(records)
        .build()
        .unwrap();
    Fixture { guard, sink, host, clock }
}

fn fixture() -> Fixture {
    fixture_with(config(), Arc::new(MemoryRecordStore::new()))
}

fn hit(attacker: PlayerId, victim: PlayerId, at: u64, health_after: f64) -> DamageEvent {
    DamageEvent {
        attacker,
        victim,
        damage: 2.0,
        victim_health_after: health_after,
        at: Timestamp(at),
        victim_location: None,
    }
}

fn status_changes(sink: &MemorySink, player: PlayerId) -> Vec<StatusChange> {
    sink.reports()
        .into_iter()
        .filter_map(|r| match r {
            Report::StatusChange(s) if s.player.id == player => Some(s.change),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Consent lifecycle
// =========================================================================

#[test]
fn test_unknown_player_is_not_attackable() {
    let f = fixture();
    assert!(!f.guard.consent().is_enabled(A, Timestamp(0)));
    assert_eq!(f.guard.consent().phase(A, Timestamp(0)), ConsentPhase::Off);
}

#[test]
fn test_join_draws_badge_and_remembers_name() {
    let f = fixture();

    f.guard.join(A, "ash", Timestamp(0));

    let badge = f.host.last_badge(A).unwrap();
    assert_eq!(badge.pvp, PvpIndicator::Off);
    assert_eq!(f.guard.consent().get_state(A, Timestamp(0)).username.as_deref(), Some("ash"));
}

#[test]
fn test_disable_takes_effect_only_after_cooldown() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    let t = f.guard.consent_command(A, ConsentCommand::Off, Timestamp(0)).unwrap();
    assert_eq!(t, Transition::CooldownStarted { ends_at: Timestamp(5_000) });

    assert!(f.guard.sweep_cooldowns(Timestamp(4_999)).is_empty());
    assert!(f.guard.consent().is_enabled(A, Timestamp(4_999)));

    assert_eq!(f.guard.sweep_cooldowns(Timestamp(5_000)), vec![A]);
    let state = f.guard.consent().get_state(A, Timestamp(5_000));
    assert!(!state.pvp_enabled);
    assert_eq!(state.cooldown_end, None);

    assert_eq!(
        status_changes(&f.sink, A),
        vec![
            StatusChange::PvpEnabled,
            StatusChange::CooldownStarted { ends_at: Timestamp(5_000) },
            StatusChange::PvpDisabled,
        ]
    );
    assert_eq!(f.host.last_badge(A).unwrap().pvp, PvpIndicator::Off);
    assert_eq!(f.host.told(A).last().map(String::as_str), Some(f.guard.config().messages.pvp_disabled.as_str()));
}

#[test]
fn test_badge_shows_cooldown_remaining() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.consent_command(A, ConsentCommand::Off, Timestamp(0)).unwrap();

    assert_eq!(f.host.last_badge(A).unwrap().pvp, PvpIndicator::CoolingDown { remaining_secs: 5 });
}

#[test]
fn test_enable_during_cooldown_is_refused_with_message() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.consent_command(A, ConsentCommand::Off, Timestamp(0)).unwrap();

    let err = f.guard.consent_command(A, ConsentCommand::On, Timestamp(2_000)).unwrap_err();

    assert!(matches!(err, PvpGuardError::Consent(_)));
    assert!(f.host.told(A).last().unwrap().contains("3s left"));
    assert!(f.guard.consent().is_enabled(A, Timestamp(2_000)));
}

#[test]
fn test_enable_after_cooldown_end_before_sweep_is_accepted() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.consent_command(A, ConsentCommand::Off, Timestamp(0)).unwrap();

    // One second past the end; the sweep has not run.
    let t = f.guard.consent_command(A, ConsentCommand::On, Timestamp(6_000)).unwrap();

    assert_eq!(t, Transition::Enabled);
    assert_eq!(f.guard.consent().phase(A, Timestamp(6_000)), ConsentPhase::On);
    assert_eq!(f.host.told(A).last().map(String::as_str), Some(f.guard.config().messages.pvp_enabled.as_str()));
    assert_eq!(f.host.last_badge(A).unwrap().pvp, PvpIndicator::On);
    assert_eq!(status_changes(&f.sink, A).last(), Some(&StatusChange::PvpEnabled));
    // The sweep has nothing left to announce.
    assert!(f.guard.sweep_cooldowns(Timestamp(6_000)).is_empty());
}

#[test]
fn test_status_command_refreshes_and_reports_changes_only() {
    let f = fixture();

    assert!(f.guard.status_command(A, PlayerStatus::Streaming, Timestamp(0)));
    assert!(!f.guard.status_command(A, PlayerStatus::Streaming, Timestamp(1)));

    assert_eq!(
        status_changes(&f.sink, A),
        vec![StatusChange::Status { status: PlayerStatus::Streaming }]
    );
    assert_eq!(f.host.last_badge(A).unwrap().status, PlayerStatus::Streaming);
}

#[test]
fn test_persistence_failure_keeps_consent_change() {
    let records = Arc::new(MemoryRecordStore::new());
    records.set_fail_writes(true);
    let f = fixture_with(config(), Arc::clone(&records));

    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();

    assert!(f.guard.consent().is_enabled(A, Timestamp(0)));
    assert!(records.get(A).is_none());
}

#[test]
fn test_pending_cooldown_survives_restart() {
    let records = Arc::new(MemoryRecordStore::new());
    records.insert(
        A,
        ConsentRecord {
            username: Some("ash".into()),
            pvp_enabled: true,
            cooldown_end: Some(Timestamp(5_000)),
            status: PlayerStatus::None,
            last_updated: Timestamp(0),
        },
    );

    // A never logs back in; the preload still lets the sweep finish it.
    let f = fixture_with(config(), records);

    assert_eq!(f.guard.sweep_cooldowns(Timestamp(5_000)), vec![A]);
}

#[test]
fn test_json_data_dir_round_trips_across_guards() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.data_dir = Some(dir.path().to_path_buf());

    let first = PvpGuard::builder().config(config.clone()).build().unwrap();
    first.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    drop(first);

    let second = PvpGuard::builder().config(config).build().unwrap();
    assert!(second.consent().is_enabled(A, Timestamp(10)));
}

// =========================================================================
// Damage sessions
// =========================================================================

#[test]
fn test_non_consensual_session_reported_once_at_expiry() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();

    f.guard.damage(hit(A, B, 0, 18.0));
    f.guard.damage(hit(B, A, 500, 18.0));
    f.guard.damage(hit(A, B, 1_000, 16.0));

    assert_eq!(f.guard.sweep_sessions(Timestamp(30_999)).total(), 0);
    let outcome = f.guard.sweep_sessions(Timestamp(31_000));
    assert_eq!(outcome.flushed, 1);
    assert_eq!(f.guard.sweep_sessions(Timestamp(90_000)).total(), 0);

    let reports: Vec<_> = f.sink.reports().into_iter().filter(|r| r.kind() == ReportKind::PvpDamageSession).collect();
    assert_eq!(reports.len(), 1);
    let Report::PvpDamageSession(session) = &reports[0] else { unreachable!() };
    assert_eq!(session.total_hits, 3);
    assert_eq!(session.initiator.as_ref().map(|p| p.id), Some(A));
    assert!(!session.consensual());
}

#[test]
fn test_consensual_session_never_reported() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.consent_command(B, ConsentCommand::On, Timestamp(0)).unwrap();

    f.guard.damage(hit(A, B, 0, 18.0));
    let outcome = f.guard.sweep_sessions(Timestamp(60_000));

    assert_eq!(outcome.dropped, 1);
    assert_eq!(f.sink.count(ReportKind::PvpDamageSession), 0);
}

#[test]
fn test_session_keeps_consent_from_first_hit() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.damage(hit(A, B, 0, 18.0));

    // A turns PvP off mid-session and the cooldown completes.
    f.guard.consent_command(A, ConsentCommand::Off, Timestamp(100)).unwrap();
    f.guard.sweep_cooldowns(Timestamp(5_100));
    f.guard.damage(hit(B, A, 5_200, 18.0));

    f.guard.sweep_sessions(Timestamp(60_000));

    let reports = f.sink.reports();
    let session = reports
        .iter()
        .find_map(|r| match r {
            Report::PvpDamageSession(s) => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(session.player1.player.id, A);
    assert!(session.player1.pvp_enabled);
    assert!(!session.player2.pvp_enabled);
}

#[test]
fn test_low_hp_alerts_respect_cooldown() {
    let f = fixture();

    f.guard.damage(hit(A, B, 0, 4.0));
    f.guard.damage(hit(A, B, 10_000, 3.0));
    assert_eq!(f.sink.count(ReportKind::LowHpAlert), 1);

    f.guard.damage(hit(A, B, 30_001, 2.0));
    assert_eq!(f.sink.count(ReportKind::LowHpAlert), 2);
}

#[test]
fn test_shutdown_flushes_open_sessions() {
    let f = fixture();
    f.guard.damage(hit(A, B, 0, 18.0));

    let outcome = f.guard.shutdown(Timestamp(1_000));

    assert_eq!(outcome.flushed, 1);
    assert!(f.guard.is_shut_down());
    assert_eq!(f.guard.sessions().open_sessions(), 0);
}

// =========================================================================
// Combat logging and kills
// =========================================================================

#[test]
fn test_disconnect_inside_tag_window_is_punished_once() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.consent_command(B, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.damage(hit(A, B, 1_000, 12.0));

    assert_eq!(f.guard.quit(B, Timestamp(10_000), None), EvasionVerdict::Punished);
    assert_eq!(f.guard.quit(B, Timestamp(10_500), None), EvasionVerdict::NotInCombat);

    assert_eq!(*f.host.killed.lock().unwrap(), vec![B]);
    assert_eq!(f.sink.count(ReportKind::CombatLog), 1);
    assert!(f.host.told(B).last().unwrap().contains("15 seconds"));
}

#[test]
fn test_disconnect_after_tag_window_is_not_punished() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.consent_command(B, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.damage(hit(A, B, 1_000, 12.0));

    assert_eq!(f.guard.quit(B, Timestamp(16_000), None), EvasionVerdict::NotInCombat);
    assert!(f.host.killed.lock().unwrap().is_empty());
    assert_eq!(f.sink.count(ReportKind::CombatLog), 0);
}

#[test]
fn test_disconnect_without_consent_is_ignored() {
    let f = fixture();
    f.guard.damage(hit(A, B, 0, 12.0));

    assert_eq!(f.guard.quit(B, Timestamp(1_000), None), EvasionVerdict::ConsentOff);
}

#[test]
fn test_death_clears_tag_and_reports_kill() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.consent_command(B, ConsentCommand::On, Timestamp(0)).unwrap();
    f.guard.damage(hit(A, B, 1_000, 0.0));

    f.guard.death(B, Some(A), Timestamp(1_000));

    assert_eq!(f.guard.quit(B, Timestamp(2_000), None), EvasionVerdict::NotInCombat);
    let kill = f
        .sink
        .reports()
        .into_iter()
        .find_map(|r| match r {
            Report::PvpKill(k) => Some(k),
            _ => None,
        })
        .unwrap();
    assert!(kill.consensual);
    assert_eq!(kill.killer.player.id, A);
    assert_eq!(kill.victim.player.id, B);
}

// =========================================================================
// Event dispatch
// =========================================================================

#[test]
fn test_dispatcher_drives_guard() {
    let f = fixture();
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(Arc::new(f.guard.clone()));

    dispatcher.dispatch(&HostEvent::Join { player: A, username: "ash".into(), at: Timestamp(0) });
    dispatcher.dispatch(&HostEvent::ConsentCommand { player: A, command: ConsentCommand::On, at: Timestamp(0) });
    // Refused commands are swallowed by the handler.
    dispatcher.dispatch(&HostEvent::ConsentCommand { player: B, command: ConsentCommand::Off, at: Timestamp(0) });
    dispatcher.dispatch(&HostEvent::StatusCommand { player: A, status: PlayerStatus::Recording, at: Timestamp(1) });

    let state = f.guard.consent().get_state(A, Timestamp(1));
    assert!(state.pvp_enabled);
    assert_eq!(state.status, PlayerStatus::Recording);
    assert_eq!(f.host.told(B), vec![f.guard.config().messages.pvp_already_off.clone()]);
}

// =========================================================================
// Cooldown hints and workers
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cooldown_hint_disables_without_sweep() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, f.guard.now()).unwrap();
    f.guard.consent_command(A, ConsentCommand::Off, f.guard.now()).unwrap();

    f.clock.advance(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(!f.guard.consent().is_enabled(A, f.guard.now()));
    assert_eq!(status_changes(&f.sink, A).last(), Some(&StatusChange::PvpDisabled));
}

#[tokio::test(start_paused = true)]
async fn test_stale_cooldown_hint_after_reenable_is_ignored() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, f.guard.now()).unwrap();
    f.guard.consent_command(A, ConsentCommand::Off, f.guard.now()).unwrap();

    // The sweep gets there first, then A opts back in before the hint fires.
    let now = f.clock.advance(Duration::from_secs(5));
    assert_eq!(f.guard.sweep_cooldowns(now), vec![A]);
    f.guard.consent_command(A, ConsentCommand::On, now).unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(f.guard.consent().is_enabled(A, f.guard.now()));
    let disabled = status_changes(&f.sink, A).into_iter().filter(|c| *c == StatusChange::PvpDisabled).count();
    assert_eq!(disabled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_hints() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, f.guard.now()).unwrap();
    f.guard.consent_command(A, ConsentCommand::Off, f.guard.now()).unwrap();

    f.guard.shutdown(f.guard.now());
    f.clock.advance(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_secs(6)).await;

    // Only a sweep could finish it now.
    assert!(f.guard.consent().is_enabled(A, f.guard.now()));
}

#[tokio::test(start_paused = true)]
async fn test_disable_after_shutdown_schedules_no_hint() {
    let f = fixture();
    f.guard.consent_command(A, ConsentCommand::On, f.guard.now()).unwrap();
    f.guard.shutdown(f.guard.now());

    f.guard.consent_command(A, ConsentCommand::Off, f.guard.now()).unwrap();
    f.clock.advance(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(f.guard.consent().is_enabled(A, f.guard.now()));
    assert!(!status_changes(&f.sink, A).contains(&StatusChange::PvpDisabled));
}

#[tokio::test(start_paused = true)]
async fn test_workers_sweep_and_stop() {
    let f = fixture();
    let workers = f.guard.spawn_workers();
    assert_eq!(workers.len(), 2);

    f.guard.consent_command(A, ConsentCommand::On, f.guard.now()).unwrap();
    f.guard.consent_command(A, ConsentCommand::Off, f.guard.now()).unwrap();
    f.guard.damage(hit(B, A, 0, 18.0));

    // Both the sweep loop and the hint race to finish the cooldown.
    f.clock.set(Timestamp(60_000));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(!f.guard.consent().is_enabled(A, f.guard.now()));
    let disabled = status_changes(&f.sink, A).into_iter().filter(|c| *c == StatusChange::PvpDisabled).count();
    assert_eq!(disabled, 1);
    assert_eq!(f.guard.sessions().open_sessions(), 0);
    assert_eq!(f.sink.count(ReportKind::PvpDamageSession), 1);

    let outcome = workers.shutdown().await;
    assert_eq!(outcome.total(), 0);
    assert!(f.guard.is_shut_down());
}

#[tokio::test]
async fn test_background_persistence_saves_records() {
    let records = Arc::new(MemoryRecordStore::new());
    let guard = PvpGuard::builder()
        .config(config())
        .record_store(records.clone())
        .background_persistence(true)
        .build()
        .unwrap();

    guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    guard.flush_records().await;

    assert!(records.get(A).unwrap().pvp_enabled);
}

/// Saves like a slow disk.
#[derive(Default)]
struct SlowRecords {
    inner: MemoryRecordStore,
}

impl RecordStore for SlowRecords {
    fn load(&self, id: PlayerId) -> Result<Option<ConsentRecord>, StoreError> {
        self.inner.load(id)
    }

    fn save(&self, id: PlayerId, record: &ConsentRecord) -> Result<(), StoreError> {
        std::thread::sleep(Duration::from_millis(20));
        self.inner.save(id, record)
    }

    fn load_all(&self) -> Result<Vec<(PlayerId, ConsentRecord)>, StoreError> {
        self.inner.load_all()
    }
}

#[tokio::test]
async fn test_workers_shutdown_waits_for_queued_saves() {
    let records = Arc::new(SlowRecords::default());
    let guard = PvpGuard::builder()
        .config(config())
        .record_store(records.clone())
        .background_persistence(true)
        .build()
        .unwrap();
    let workers = guard.spawn_workers();

    for id in 1..=10 {
        guard.consent_command(PlayerId(id), ConsentCommand::On, Timestamp(0)).unwrap();
    }
    workers.shutdown().await;

    assert_eq!(records.inner.len(), 10);
    assert!((1..=10).all(|id| records.inner.get(PlayerId(id)).is_some_and(|r| r.pvp_enabled)));
}

#[tokio::test]
async fn test_flush_records_after_shutdown_saves_pending_changes() {
    let records = Arc::new(SlowRecords::default());
    let guard = PvpGuard::builder()
        .config(config())
        .record_store(records.clone())
        .background_persistence(true)
        .build()
        .unwrap();

    guard.consent_command(A, ConsentCommand::On, Timestamp(0)).unwrap();
    guard.status_command(A, PlayerStatus::Recording, Timestamp(1));
    guard.shutdown(Timestamp(2));
    guard.flush_records().await;

    let saved = records.inner.get(A).unwrap();
    assert!(saved.pvp_enabled);
    assert_eq!(saved.status, PlayerStatus::Recording);
}
