//! The consent store: every player's consent state, shared across threads.
//!
//! # Concurrency
//!
//! States live in a `DashMap`, which shards its entries behind separate
//! locks. Every mutation of one player happens while holding that player's
//! entry, so a `/pvp off` command on the event thread and the cooldown
//! sweep on a worker thread cannot interleave and lose an update. Two
//! different players almost never share a shard lock, and never hold one
//! for longer than a field assignment plus a channel send.
//!
//! Persistence runs through the [`RecordWriter`] while the entry is still
//! held. With a background writer that is only a channel send, and it
//! guarantees records for one player reach the queue in mutation order.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use pvpguard_protocol::{PlayerBadge, PlayerId, PlayerStatus, Timestamp};

use crate::{
    ConsentError, ConsentPhase, MemoryRecordStore, PlayerConsentState, RecordStore,
    RecordWriter, Transition,
};

/// Owns and mutates every player's [`PlayerConsentState`].
///
/// ## Lifecycle of one player
///
/// ```text
/// get_state() ──→ [Off] ──enable()──→ [On] ──begin_disable()──→ [CoolingDown]
///                   ▲                                                │
///                   └──────── sweep_expired_cooldowns() / complete_cooldown()
/// ```
///
/// States are created on first reference (cache, then record store, then
/// default) and are never evicted.
pub struct PlayerConsentStore {
    states: DashMap<PlayerId, PlayerConsentState>,
    records: Arc<dyn RecordStore>,
    writer: RecordWriter,
}

impl PlayerConsentStore {
    /// Creates a store that reads through `records` and saves via `writer`.
    pub fn new(records: Arc<dyn RecordStore>, writer: RecordWriter) -> Self {
        Self { states: DashMap::new(), records, writer }
    }

    /// A store that saves synchronously into `records`.
    pub fn inline(records: Arc<dyn RecordStore>) -> Self {
        let writer = RecordWriter::inline(Arc::clone(&records));
        Self::new(records, writer)
    }

    /// A store backed by a fresh [`MemoryRecordStore`].
    pub fn in_memory() -> Self {
        Self::inline(Arc::new(MemoryRecordStore::new()))
    }

    /// Number of players currently cached.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// A snapshot of the player's state, materializing it if needed.
    ///
    /// Unknown players are not an error: they get the default state (PvP
    /// off, no status).
    pub fn get_state(&self, id: PlayerId, now: Timestamp) -> PlayerConsentState {
        self.entry(id, now).clone()
    }

    /// Whether the player currently consents (`On` or `CoolingDown`).
    pub fn is_enabled(&self, id: PlayerId, now: Timestamp) -> bool {
        self.entry(id, now).pvp_enabled
    }

    pub fn phase(&self, id: PlayerId, now: Timestamp) -> ConsentPhase {
        self.entry(id, now).phase()
    }

    pub fn badge(&self, id: PlayerId, now: Timestamp) -> PlayerBadge {
        self.entry(id, now).badge(now)
    }

    /// Turns PvP on.
    ///
    /// A cooldown that has run out but was not swept yet counts as finished,
    /// so the player goes straight back to `On`.
    ///
    /// # Errors
    /// [`ConsentError::InvalidTransition`] if a disable cooldown is running.
    /// Consent cannot be restored early; the player waits it out.
    pub fn enable(&self, id: PlayerId, now: Timestamp) -> Result<Transition, ConsentError> {
        let mut state = self.entry(id, now);
        if state.cooldown_expired(now) {
            tracing::debug!(player_id = %id, "expired cooldown finished by enable");
        }

        match state.phase() {
            ConsentPhase::On => {
                tracing::debug!(player_id = %id, "pvp already enabled");
                Ok(Transition::Unchanged)
            }
            phase @ ConsentPhase::CoolingDown { .. } if !state.cooldown_expired(now) => {
                Err(ConsentError::InvalidTransition { player: id, phase, action: "enable" })
            }
            ConsentPhase::Off | ConsentPhase::CoolingDown { .. } => {
                state.pvp_enabled = true;
                state.cooldown_end = None;
                state.last_updated = now;
                self.writer.write(id, state.to_record());
                tracing::info!(player_id = %id, "pvp enabled");
                Ok(Transition::Enabled)
            }
        }
    }

    /// Starts the disable cooldown. PvP stays on until it expires.
    ///
    /// # Errors
    /// [`ConsentError::InvalidTransition`] if PvP is off or a cooldown is
    /// already running.
    pub fn begin_disable(
        &self,
        id: PlayerId,
        cooldown: Duration,
        now: Timestamp,
    ) -> Result<Transition, ConsentError> {
        let mut state = self.entry(id, now);

        match state.phase() {
            ConsentPhase::On => {
                let ends_at = now.saturating_add(cooldown);
                state.cooldown_end = Some(ends_at);
                state.last_updated = now;
                self.writer.write(id, state.to_record());
                tracing::info!(player_id = %id, %ends_at, "pvp disable cooldown started");
                Ok(Transition::CooldownStarted { ends_at })
            }
            phase => Err(ConsentError::InvalidTransition {
                player: id,
                phase,
                action: "disable",
            }),
        }
    }

    /// Finishes every cooldown that has run out at `now`.
    ///
    /// Returns the players that transitioned to `Off`, each exactly once.
    pub fn sweep_expired_cooldowns(&self, now: Timestamp) -> Vec<PlayerId> {
        // Collect first: mutating while iterating a DashMap would deadlock
        // on the shard the iterator is holding.
        let candidates: Vec<PlayerId> = self
            .states
            .iter()
            .filter(|s| s.cooldown_expired(now))
            .map(|s| s.player_id)
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.complete_cooldown(*id, now))
            .collect()
    }

    /// Finishes one player's cooldown if, and only if, it has expired.
    ///
    /// Both the periodic sweep and the per-player completion hint land
    /// here. The check runs under the player's entry lock, so a player who
    /// was already swept, or who never had a cooldown, is left alone and
    /// the transition is reported once.
    pub fn complete_cooldown(&self, id: PlayerId, now: Timestamp) -> bool {
        let Some(mut state) = self.states.get_mut(&id) else {
            return false;
        };
        if !state.cooldown_expired(now) {
            return false;
        }

        state.pvp_enabled = false;
        state.cooldown_end = None;
        state.last_updated = now;
        self.writer.write(id, state.to_record());
        tracing::info!(player_id = %id, "pvp disabled after cooldown");
        true
    }

    /// Sets the player's content status. Returns whether it changed.
    pub fn set_status(&self, id: PlayerId, status: PlayerStatus, now: Timestamp) -> bool {
        let mut state = self.entry(id, now);
        if state.status == status {
            return false;
        }

        state.status = status;
        state.last_updated = now;
        self.writer.write(id, state.to_record());
        tracing::info!(player_id = %id, %status, "status changed");
        true
    }

    /// Records the player's display name for report payloads.
    pub fn remember_username(&self, id: PlayerId, username: &str, now: Timestamp) {
        let mut state = self.entry(id, now);
        if state.username.as_deref() == Some(username) {
            return;
        }

        state.username = Some(username.to_owned());
        state.last_updated = now;
        self.writer.write(id, state.to_record());
    }

    /// Loads every persisted record into the cache.
    ///
    /// Run once at startup so cooldowns that were pending at shutdown are
    /// swept even for players who never log back in. Players already cached
    /// are kept as they are. Returns how many were loaded.
    pub fn preload(&self, now: Timestamp) -> usize {
        let records = match self.records.load_all() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "failed to preload consent records");
                return 0;
            }
        };

        let mut loaded = 0;
        for (id, record) in records {
            self.states.entry(id).or_insert_with(|| {
                loaded += 1;
                PlayerConsentState::from_record(id, record)
            });
        }

        let pending = self.states.iter().filter(|s| s.cooldown_end.is_some()).count();
        tracing::info!(loaded, pending, at = %now, "consent records preloaded");
        loaded
    }

    /// Waits until every save issued so far has reached the record store.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// The player's entry, materialized from the record store or default.
    ///
    /// The record is loaded before the shard lock is taken. If two callers
    /// race on a new player, the first insert wins and the other load is
    /// discarded.
    fn entry(&self, id: PlayerId, now: Timestamp) -> RefMut<'_, PlayerId, PlayerConsentState> {
        if let Some(state) = self.states.get_mut(&id) {
            return state;
        }

        let loaded = self.load_or_default(id, now);
        self.states.entry(id).or_insert(loaded)
    }

    fn load_or_default(&self, id: PlayerId, now: Timestamp) -> PlayerConsentState {
        match self.records.load(id) {
            Ok(Some(record)) => PlayerConsentState::from_record(id, record),
            Ok(None) => PlayerConsentState::new(id, now),
            Err(e) => {
                tracing::error!(player_id = %id, error = %e, "unreadable consent record, using defaults");
                PlayerConsentState::new(id, now)
            }
        }
    }
}

impl std::fmt::Debug for PlayerConsentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerConsentStore")
            .field("players", &self.states.len())
            .field("writer", &self.writer)
            .finish()
    }
}
