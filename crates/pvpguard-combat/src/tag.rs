//! Combat tags: "this player was in a fight a moment ago".

use std::time::Duration;

use dashmap::DashMap;
use pvpguard_protocol::{PlayerId, Timestamp};

/// Tracks the last time each player was involved in consensual combat.
///
/// A player is tagged while `now - tagged_at < tag_duration`. Expired
/// entries are harmless (every query checks the window) and are purged by
/// [`sweep`](Self::sweep).
#[derive(Debug)]
pub struct CombatTagTracker {
    tags: DashMap<PlayerId, Timestamp>,
    duration: Duration,
}

impl CombatTagTracker {
    pub fn new(duration: Duration) -> Self {
        Self { tags: DashMap::new(), duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Tags the player, or refreshes an existing tag.
    ///
    /// A late event carrying an older timestamp never shortens a tag.
    pub fn tag(&self, id: PlayerId, now: Timestamp) {
        self.tags
            .entry(id)
            .and_modify(|at| *at = (*at).max(now))
            .or_insert(now);
    }

    pub fn is_tagged(&self, id: PlayerId, now: Timestamp) -> bool {
        self.tag_age(id, now).is_some()
    }

    /// Time since the player was last tagged, if the tag is still live.
    pub fn tag_age(&self, id: PlayerId, now: Timestamp) -> Option<Duration> {
        let tagged_at = *self.tags.get(&id)?;
        let age = now.saturating_since(tagged_at);
        (age < self.duration).then_some(age)
    }

    /// Removes the player's tag. Returns whether one existed.
    ///
    /// Safe to call any number of times; only the first call after a tag
    /// returns `true`. Callers racing to act on a tag use that as the claim.
    pub fn clear(&self, id: PlayerId) -> bool {
        self.tags.remove(&id).is_some()
    }

    /// Purges expired tags. Returns how many were removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let mut removed = 0;
        self.tags.retain(|_, tagged_at| {
            let live = now.saturating_since(*tagged_at) < self.duration;
            if !live {
                removed += 1;
            }
            live
        });
        if removed > 0 {
            tracing::debug!(removed, "expired combat tags purged");
        }
        removed
    }

    /// Number of entries, expired or not.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
