//! `PvpGuard` builder and host-facing handlers.
//!
//! This is the entry point for embedding pvpguard in a game server. It ties
//! the layers together: host events → consent / combat → sinks.

use std::sync::Arc;
use std::time::Duration;

use pvpguard_combat::{
    CombatEvasionDetector, CombatTagTracker, DamageSessionAggregator, EvasionVerdict, SweepOutcome,
};
use pvpguard_consent::{
    ConsentError, ConsentPhase, JsonFileRecordStore, MemoryRecordStore, PlayerConsentStore,
    RecordStore, RecordWriter, Transition,
};
use pvpguard_protocol::{
    KillParticipant, Location, PlayerId, PlayerStatus, PvpKillReport, Report, StatusChange,
    StatusChangeReport, Timestamp,
};
use pvpguard_sink::{Discard, Messaging, PresentationUpdate, ReportingSink, WorldMutation};
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::config::{GuardConfig, Messages};
use crate::events::{ConsentCommand, DamageEvent, HostEvent, HostEventHandler};
use crate::PvpGuardError;

/// Shared state behind every [`PvpGuard`] clone.
pub(crate) struct GuardInner {
    pub(crate) config: GuardConfig,
    pub(crate) consent: Arc<PlayerConsentStore>,
    pub(crate) tags: Arc<CombatTagTracker>,
    pub(crate) sessions: DamageSessionAggregator,
    pub(crate) evasion: CombatEvasionDetector,
    pub(crate) sink: Arc<dyn ReportingSink>,
    pub(crate) presentation: Arc<dyn PresentationUpdate>,
    pub(crate) messaging: Arc<dyn Messaging>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Flipped to `true` once; stops workers and pending cooldown hints.
    pub(crate) shutdown: watch::Sender<bool>,
}

/// Builder for a [`PvpGuard`].
///
/// # Example
///
/// ```rust,ignore
/// let (dispatcher, _worker) = ReportDispatcher::spawn(LogDelivery::new(), config.dispatch.clone());
/// let guard = PvpGuard::builder()
///     .config(config)
///     .sink(dispatcher)
///     .presentation(tab_list)
///     .world(world)
///     .messaging(chat)
///     .build()?;
/// let workers = guard.spawn_workers();
/// ```
pub struct PvpGuardBuilder {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ReportingSink>,
    presentation: Arc<dyn PresentationUpdate>,
    world: Arc<dyn WorldMutation>,
    messaging: Arc<dyn Messaging>,
    record_store: Option<Arc<dyn RecordStore>>,
    background_persistence: bool,
}

impl PvpGuardBuilder {
    /// A builder with default config, the system clock, and collaborators
    /// that discard everything.
    pub fn new() -> Self {
        Self {
            config: GuardConfig::default(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(Discard),
            presentation: Arc::new(Discard),
            world: Arc::new(Discard),
            messaging: Arc::new(Discard),
            record_store: None,
            background_persistence: false,
        }
    }

    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(mut self, sink: impl ReportingSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn presentation(mut self, presentation: impl PresentationUpdate) -> Self {
        self.presentation = Arc::new(presentation);
        self
    }

    pub fn world(mut self, world: impl WorldMutation) -> Self {
        self.world = Arc::new(world);
        self
    }

    pub fn messaging(mut self, messaging: impl Messaging) -> Self {
        self.messaging = Arc::new(messaging);
        self
    }

    /// Uses `store` for consent records, overriding `data_dir`.
    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    /// Saves records on a blocking worker instead of the caller's thread.
    pub fn background_persistence(mut self, enabled: bool) -> Self {
        self.background_persistence = enabled;
        self
    }

    /// Builds the guard and preloads every persisted consent record.
    ///
    /// Records come from the explicit [`record_store`](Self::record_store),
    /// else a [`JsonFileRecordStore`] in `data_dir`, else memory.
    ///
    /// # Errors
    /// - [`PvpGuardError::Store`] if `data_dir` cannot be created.
    /// - [`PvpGuardError::Config`] if background persistence was requested
    ///   outside a Tokio runtime.
    pub fn build(self) -> Result<PvpGuard, PvpGuardError> {
        let config = self.config.validated();

        let records: Arc<dyn RecordStore> = match (self.record_store, &config.data_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(JsonFileRecordStore::open(dir.clone())?),
            (None, None) => Arc::new(MemoryRecordStore::new()),
        };

        let writer = if self.background_persistence {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(PvpGuardError::Config(
                    "background persistence requires a Tokio runtime".into(),
                ));
            }
            // Drained through `flush_records`; the worker exits once the
            // last writer clone is dropped.
            let (writer, _worker) = RecordWriter::spawn(Arc::clone(&records));
            writer
        } else {
            RecordWriter::inline(Arc::clone(&records))
        };

        let consent = Arc::new(PlayerConsentStore::new(records, writer));
        let tags = Arc::new(CombatTagTracker::new(config.combat.combat_tag()));
        let sessions = DamageSessionAggregator::new(
            config.combat.clone(),
            Arc::clone(&consent),
            Arc::clone(&self.sink),
        );
        let evasion = CombatEvasionDetector::new(
            Arc::clone(&consent),
            Arc::clone(&tags),
            Arc::clone(&self.sink),
            self.world,
            Arc::clone(&self.messaging),
            Messages::render(&config.messages.combat_log, config.combat.combat_tag_secs),
        );

        let loaded = consent.preload(self.clock.now());
        tracing::info!(
            loaded,
            cooldown_secs = config.consent.cooldown_secs,
            combat_tag_secs = config.combat.combat_tag_secs,
            "pvpguard ready"
        );

        let (shutdown, _) = watch::channel(false);
        Ok(PvpGuard {
            inner: Arc::new(GuardInner {
                config,
                consent,
                tags,
                sessions,
                evasion,
                sink: self.sink,
                presentation: self.presentation,
                messaging: self.messaging,
                clock: self.clock,
                shutdown,
            }),
        })
    }
}

impl Default for PvpGuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The PvP consent system, ready to receive host events.
///
/// Cheap to clone; clones share all state. Every handler takes `&self` and
/// returns without waiting on I/O.
#[derive(Clone)]
pub struct PvpGuard {
    pub(crate) inner: Arc<GuardInner>,
}

impl PvpGuard {
    pub fn builder() -> PvpGuardBuilder {
        PvpGuardBuilder::new()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.inner.config
    }

    pub fn consent(&self) -> &PlayerConsentStore {
        &self.inner.consent
    }

    pub fn tags(&self) -> &CombatTagTracker {
        &self.inner.tags
    }

    pub fn sessions(&self) -> &DamageSessionAggregator {
        &self.inner.sessions
    }

    /// The current time according to the configured clock.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    // -----------------------------------------------------------------------
    // Host events
    // -----------------------------------------------------------------------

    /// A player damaged another player.
    ///
    /// Both participants are tagged when they consent, so a consenting
    /// player who hits a non-consenting one is still in combat.
    pub fn damage(&self, event: DamageEvent) {
        let (attacker, victim, at) = (event.attacker, event.victim, event.at);
        if !self.inner.sessions.record_damage(event) {
            return;
        }

        for id in [attacker, victim] {
            if self.inner.consent.is_enabled(id, at) {
                self.inner.tags.tag(id, at);
            }
        }
    }

    /// A player joined. Warms their consent state and draws their badge.
    pub fn join(&self, id: PlayerId, username: &str, now: Timestamp) {
        self.inner.consent.remember_username(id, username, now);
        self.refresh(id, now);
    }

    /// A player disconnected.
    pub fn quit(&self, id: PlayerId, now: Timestamp, location: Option<Location>) -> EvasionVerdict {
        let verdict = self.inner.evasion.on_disconnect(id, now, location);
        tracing::debug!(player_id = %id, ?verdict, "player quit");
        verdict
    }

    /// A player died. `killer` is set when another player landed the blow.
    pub fn death(&self, id: PlayerId, killer: Option<PlayerId>, now: Timestamp) {
        self.inner.evasion.on_death(id);

        let Some(killer) = killer.filter(|k| *k != id) else {
            return;
        };

        let killer = self.inner.consent.get_state(killer, now);
        let victim = self.inner.consent.get_state(id, now);
        let consensual = killer.pvp_enabled && victim.pvp_enabled;
        tracing::info!(killer = %killer.player_id, victim = %id, consensual, "pvp kill");

        self.inner.sink.emit(Report::PvpKill(PvpKillReport {
            timestamp: now,
            consensual,
            killer: KillParticipant {
                player: killer.player_ref(),
                pvp_enabled: killer.pvp_enabled,
                status: killer.status,
            },
            victim: KillParticipant {
                player: victim.player_ref(),
                pvp_enabled: victim.pvp_enabled,
                status: victim.status,
            },
        }));
    }

    /// Runs `/pvp on` or `/pvp off` for a player.
    ///
    /// The player is always told the outcome, including refusals.
    ///
    /// # Errors
    /// [`PvpGuardError::Consent`] when the command is not allowed in the
    /// player's current phase. Nothing changes in that case.
    pub fn consent_command(
        &self,
        id: PlayerId,
        command: ConsentCommand,
        now: Timestamp,
    ) -> Result<Transition, PvpGuardError> {
        let cooldown = self.inner.config.consent.cooldown();
        let result = match command {
            ConsentCommand::On => self.inner.consent.enable(id, now),
            ConsentCommand::Off => self.inner.consent.begin_disable(id, cooldown, now),
        };

        let messages = &self.inner.config.messages;
        match &result {
            Ok(Transition::Enabled) => {
                self.report_change(id, StatusChange::PvpEnabled, now);
                self.refresh(id, now);
                self.notify(id, &messages.pvp_enabled);
            }
            Ok(Transition::Unchanged) => self.notify(id, &messages.pvp_already_on),
            Ok(Transition::CooldownStarted { ends_at }) => {
                self.report_change(id, StatusChange::CooldownStarted { ends_at: *ends_at }, now);
                self.refresh(id, now);
                self.notify(id, &Messages::render(&messages.pvp_cooldown_started, cooldown.as_secs()));
                self.schedule_cooldown_hint(id, cooldown);
            }
            Err(ConsentError::InvalidTransition { phase: ConsentPhase::CoolingDown { ends_at }, .. }) => {
                let left = ends_at.saturating_since(now).as_millis().div_ceil(1_000);
                let left = u64::try_from(left).unwrap_or(u64::MAX);
                self.notify(id, &Messages::render(&messages.pvp_cooling_down, left));
            }
            Err(_) => self.notify(id, &messages.pvp_already_off),
        }

        Ok(result?)
    }

    /// Sets a player's content status. Returns whether it changed.
    pub fn status_command(&self, id: PlayerId, status: PlayerStatus, now: Timestamp) -> bool {
        if !self.inner.consent.set_status(id, status, now) {
            return false;
        }
        self.refresh(id, now);
        self.report_change(id, StatusChange::Status { status }, now);
        self.notify(id, &self.inner.config.messages.status_changed);
        true
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// Finishes expired cooldowns. Returns the players now off.
    pub fn sweep_cooldowns(&self, now: Timestamp) -> Vec<PlayerId> {
        let disabled = self.inner.consent.sweep_expired_cooldowns(now);
        for id in &disabled {
            self.announce_disabled(*id, now);
        }
        disabled
    }

    /// Drops expired combat tags. Returns how many were dropped.
    pub fn sweep_tags(&self, now: Timestamp) -> usize {
        self.inner.tags.sweep(now)
    }

    /// Flushes idle damage sessions.
    pub fn sweep_sessions(&self, now: Timestamp) -> SweepOutcome {
        self.inner.sessions.sweep_expired_sessions(now)
    }

    /// Stops workers and cooldown hints, then flushes every open session.
    ///
    /// With background persistence, follow up with
    /// [`flush_records`](Self::flush_records) before the runtime exits.
    /// [`GuardWorkers::shutdown`](crate::GuardWorkers::shutdown) does both.
    pub fn shutdown(&self, now: Timestamp) -> SweepOutcome {
        self.inner.shutdown.send_replace(true);
        let outcome = self.inner.sessions.flush_all(now);
        tracing::info!(flushed = outcome.flushed, dropped = outcome.dropped, "pvpguard shut down");
        outcome
    }

    /// Waits until every consent change made so far has been saved.
    pub async fn flush_records(&self) {
        self.inner.consent.flush().await;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Finishes one cooldown if it is still due. Used by the hint task.
    fn finish_cooldown(&self, id: PlayerId, now: Timestamp) -> bool {
        if !self.inner.consent.complete_cooldown(id, now) {
            tracing::debug!(player_id = %id, "cooldown hint found nothing to do");
            return false;
        }
        self.announce_disabled(id, now);
        true
    }

    fn announce_disabled(&self, id: PlayerId, now: Timestamp) {
        self.report_change(id, StatusChange::PvpDisabled, now);
        self.refresh(id, now);
        self.notify(id, &self.inner.config.messages.pvp_disabled);
    }

    /// Wakes up when `id`'s cooldown should be over and finishes it.
    ///
    /// Only a hint: the state is re-checked when it fires, and the periodic
    /// sweep covers players whose hint was lost.
    fn schedule_cooldown_hint(&self, id: PlayerId, cooldown: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(player_id = %id, "no runtime for cooldown hint, leaving it to the sweep");
            return;
        };
        let mut shutdown = self.inner.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }

        let guard = self.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(cooldown) => {
                    let now = guard.now();
                    guard.finish_cooldown(id, now);
                }
                _ = shutdown.changed() => {}
            }
        });
    }

    fn report_change(&self, id: PlayerId, change: StatusChange, now: Timestamp) {
        let player = self.inner.consent.get_state(id, now).player_ref();
        self.inner.sink.emit(Report::StatusChange(StatusChangeReport {
            timestamp: now,
            player,
            change,
        }));
    }

    fn refresh(&self, id: PlayerId, now: Timestamp) {
        let badge = self.inner.consent.badge(id, now);
        self.inner.presentation.refresh(id, &badge);
    }

    fn notify(&self, id: PlayerId, text: &str) {
        self.inner.messaging.notify(id, text);
    }
}

impl HostEventHandler for PvpGuard {
    fn handle(&self, event: &HostEvent) {
        match event {
            HostEvent::Damage(hit) => self.damage(hit.clone()),
            HostEvent::Join { player, username, at } => self.join(*player, username, *at),
            HostEvent::Quit { player, location, at } => {
                self.quit(*player, *at, location.clone());
            }
            HostEvent::Death { player, killer, at } => self.death(*player, *killer, *at),
            HostEvent::ConsentCommand { player, command, at } => {
                if let Err(e) = self.consent_command(*player, *command, *at) {
                    tracing::debug!(player_id = %player, error = %e, "consent command refused");
                }
            }
            HostEvent::StatusCommand { player, status, at } => {
                self.status_command(*player, *status, *at);
            }
        }
    }
}

impl std::fmt::Debug for PvpGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvpGuard")
            .field("players", &self.inner.consent.len())
            .field("open_sessions", &self.inner.sessions.open_sessions())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
