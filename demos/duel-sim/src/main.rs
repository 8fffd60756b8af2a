use std::sync::{Arc, Mutex};
use std::time::Duration;

use pvpguard::prelude::*;
use pvpguard::telemetry::init_tracing;

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// A stand-in game server: prints what a real one would render or do.
#[derive(Default)]
struct Arena {
    killed: Mutex<Vec<PlayerId>>,
}

impl PresentationUpdate for Arena {
    fn refresh(&self, player: PlayerId, badge: &PlayerBadge) {
        let light = match badge.pvp {
            PvpIndicator::Off => "off".to_string(),
            PvpIndicator::On => "ON".to_string(),
            PvpIndicator::CoolingDown { remaining_secs } => format!("on ({remaining_secs}s)"),
        };
        tracing::info!(player = %player, pvp = %light, status = %badge.status, "badge");
    }
}

impl WorldMutation for Arena {
    fn kill(&self, player: PlayerId) {
        tracing::info!(player = %player, "struck down");
        if let Ok(mut killed) = self.killed.lock() {
            killed.push(player);
        }
    }
}

impl Messaging for Arena {
    fn notify(&self, player: PlayerId, text: &str) {
        tracing::info!(player = %player, "chat: {text}");
    }
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

const ASH: PlayerId = PlayerId(1);
const BRAM: PlayerId = PlayerId(2);
const CORA: PlayerId = PlayerId(3);

fn swing(guard: &PvpGuard, clock: &ManualClock, attacker: PlayerId, victim: PlayerId, health_after: f64) {
    let at = clock.advance(Duration::from_millis(800));
    guard.handle(&HostEvent::Damage(DamageEvent {
        attacker,
        victim,
        damage: 3.0,
        victim_health_after: health_after,
        at,
        victim_location: Some(Location { world: "arena".into(), x: 12.5, y: 64.0, z: -4.0 }),
    }));
}

/// Plays out three encounters:
///
/// 1. Ash and Bram both opt in and duel. Nothing is reported.
/// 2. Bram jumps Cora, who never opted in. The session is reported.
/// 3. Ash hits Bram and Bram logs out mid-fight. Bram is punished.
fn run_script(guard: &PvpGuard, clock: &ManualClock) -> Result<(), PvpGuardError> {
    let mut events = EventDispatcher::new();
    events.register(Arc::new(guard.clone()));

    for (player, name) in [(ASH, "ash"), (BRAM, "bram"), (CORA, "cora")] {
        events.dispatch(&HostEvent::Join { player, username: name.into(), at: clock.now() });
    }

    guard.consent_command(ASH, ConsentCommand::On, clock.now())?;
    guard.consent_command(BRAM, ConsentCommand::On, clock.now())?;
    events.dispatch(&HostEvent::StatusCommand { player: CORA, status: PlayerStatus::Streaming, at: clock.now() });

    tracing::info!("-- round 1: consensual duel");
    for health in [17.0, 14.0, 11.0] {
        swing(guard, clock, ASH, BRAM, health);
        swing(guard, clock, BRAM, ASH, health);
    }

    tracing::info!("-- round 2: bram ambushes cora");
    for health in [16.0, 10.0, 4.0] {
        swing(guard, clock, BRAM, CORA, health);
    }
    events.dispatch(&HostEvent::Death { player: CORA, killer: Some(BRAM), at: clock.now() });

    let later = clock.advance(guard.config().combat.session_timeout());
    let outcome = guard.sweep_sessions(later);
    tracing::info!(flushed = outcome.flushed, dropped = outcome.dropped, "sessions swept");

    tracing::info!("-- round 3: bram logs out mid-fight");
    swing(guard, clock, ASH, BRAM, 9.0);
    let verdict = guard.quit(BRAM, clock.advance(Duration::from_secs(2)), None);
    tracing::info!(?verdict, "bram disconnected");

    // Ash wants out; the cooldown has to run first.
    guard.consent_command(ASH, ConsentCommand::Off, clock.now())?;
    let done = clock.advance(guard.config().consent.cooldown());
    guard.sweep_cooldowns(done);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");

    let config = match std::env::args().nth(1) {
        Some(path) => GuardConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => GuardConfig::default(),
    };

    let (dispatcher, delivery) = ReportDispatcher::spawn(LogDelivery::new(), config.dispatch.clone());
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
    let guard = PvpGuard::builder()
        .config(config)
        .clock(clock.clone())
        .sink(dispatcher)
        .presentation(Arena::default())
        .world(Arena::default())
        .messaging(Arena::default())
        .build()?;

    run_script(&guard, &clock)?;
    guard.shutdown(clock.now());

    // Dropping the guard closes the report channel; the worker drains it.
    drop(guard);
    let stats = delivery.await?;
    tracing::info!(delivered = stats.delivered, failed = stats.failed, "reports delivered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted() -> (Arc<MemorySink>, Arc<Arena>) {
        let sink = Arc::new(MemorySink::new());
        let arena = Arc::new(Arena::default());
        let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
        let guard = PvpGuard::builder()
            .clock(clock.clone())
            .sink(Arc::clone(&sink))
            .world(Arc::clone(&arena))
            .build()
            .unwrap();

        run_script(&guard, &clock).unwrap();
        guard.shutdown(clock.now());
        (sink, arena)
    }

    #[test]
    fn test_script_reports_only_the_ambush() {
        let (sink, _) = scripted();
        assert_eq!(sink.count(ReportKind::PvpDamageSession), 1);
        let session = sink
            .reports()
            .into_iter()
            .find_map(|r| match r {
                Report::PvpDamageSession(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(session.player1.player.id, BRAM);
        assert_eq!(session.player2.player.id, CORA);
    }

    #[test]
    fn test_script_raises_one_low_hp_alert_and_one_kill() {
        let (sink, _) = scripted();
        assert_eq!(sink.count(ReportKind::LowHpAlert), 1);
        assert_eq!(sink.count(ReportKind::PvpKill), 1);
    }

    #[test]
    fn test_script_punishes_combat_log() {
        let (sink, arena) = scripted();
        assert_eq!(sink.count(ReportKind::CombatLog), 1);
        assert_eq!(*arena.killed.lock().unwrap(), vec![BRAM]);
    }
}
