//! Damage sessions: one ongoing fight between two players.
//!
//! A session is shared between the event thread (appending hits) and the
//! sweep worker (flushing idle sessions), so it is split in two:
//!
//! - **Consent snapshots**: one set-once atomic cell per participant.
//!   The first capture wins; later captures read the stored value.
//! - **Timeline**: hits and timestamps behind a short `Mutex`. Nothing
//!   inside the lock does I/O.
//!
//! ```text
//!                  ┌────────────── SessionCell ──────────────┐
//! record_damage ──▶│ snapshots: [low, high]   (atomic, CAS)  │
//!                  │ timeline:  Mutex<Timeline>              │◀── sweep
//!                  └─────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use pvpguard_protocol::{DamageEventRecord, PlayerId, Timestamp};

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// The unordered pair of players in a session, stored smaller id first.
///
/// `SessionKey::new(a, b) == SessionKey::new(b, a)`, so hits in either
/// direction land in the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    low: PlayerId,
    high: PlayerId,
}

impl SessionKey {
    pub fn new(a: PlayerId, b: PlayerId) -> Self {
        if a <= b { Self { low: a, high: b } } else { Self { low: b, high: a } }
    }

    pub fn low(&self) -> PlayerId {
        self.low
    }

    pub fn high(&self) -> PlayerId {
        self.high
    }

    /// 0 for the smaller id, 1 for the larger, `None` for an outsider.
    pub fn slot(&self, id: PlayerId) -> Option<usize> {
        if id == self.low {
            Some(0)
        } else if id == self.high {
            Some(1)
        } else {
            None
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.low, self.high)
    }
}

// ---------------------------------------------------------------------------
// ConsentSnapshot
// ---------------------------------------------------------------------------

const UNSET: u8 = 0;
const REFUSED: u8 = 1;
const GRANTED: u8 = 2;

/// A participant's consent as it was when they entered the session.
///
/// Written at most once. Concurrent first captures race on a
/// compare-and-swap against `UNSET`; the loser adopts the winner's value,
/// so every reader agrees.
#[derive(Debug, Default)]
pub struct ConsentSnapshot(AtomicU8);

impl ConsentSnapshot {
    pub fn get(&self) -> Option<bool> {
        decode(self.0.load(Ordering::Acquire))
    }

    /// Stores `read()` if nothing is stored yet and returns the stored value.
    ///
    /// `read` is only called while the cell is still unset.
    pub fn capture_with(&self, read: impl FnOnce() -> bool) -> bool {
        if let Some(value) = self.get() {
            return value;
        }
        let value = read();
        let encoded = if value { GRANTED } else { REFUSED };
        match self.0.compare_exchange(UNSET, encoded, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => value,
            Err(existing) => decode(existing).unwrap_or(value),
        }
    }
}

fn decode(raw: u8) -> Option<bool> {
    match raw {
        GRANTED => Some(true),
        REFUSED => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// The mutable half of a session.
#[derive(Debug)]
pub(crate) struct Timeline {
    pub(crate) start: Timestamp,
    pub(crate) last_damage: Timestamp,
    pub(crate) initiator: Option<PlayerId>,
    pub(crate) events: Vec<DamageEventRecord>,
    /// Set by the sweep when the session is removed. A producer that finds
    /// it set must start over on a fresh session.
    pub(crate) closed: bool,
}

impl Timeline {
    pub(crate) fn is_idle(&self, now: Timestamp, timeout: Duration) -> bool {
        now.saturating_since(self.last_damage) >= timeout
    }

    pub(crate) fn duration(&self) -> Duration {
        self.last_damage.saturating_since(self.start)
    }

    pub(crate) fn total_damage(&self) -> f64 {
        self.events.iter().map(|e| e.damage).sum()
    }

    /// Damage and hit count dealt by `attacker` to the other participant.
    pub(crate) fn dealt_by(&self, attacker: PlayerId) -> (f64, usize) {
        self.events
            .iter()
            .filter(|e| e.attacker == attacker)
            .fold((0.0, 0), |(dmg, hits), e| (dmg + e.damage, hits + 1))
    }
}

// ---------------------------------------------------------------------------
// SessionCell
// ---------------------------------------------------------------------------

/// One session, shared through an `Arc` between producers and the sweep.
#[derive(Debug)]
pub(crate) struct SessionCell {
    pub(crate) key: SessionKey,
    pub(crate) snapshots: [ConsentSnapshot; 2],
    timeline: Mutex<Timeline>,
}

impl SessionCell {
    pub(crate) fn new(key: SessionKey, at: Timestamp) -> Self {
        Self {
            key,
            snapshots: [ConsentSnapshot::default(), ConsentSnapshot::default()],
            timeline: Mutex::new(Timeline {
                start: at,
                last_damage: at,
                initiator: None,
                events: Vec::new(),
                closed: false,
            }),
        }
    }

    pub(crate) fn timeline(&self) -> MutexGuard<'_, Timeline> {
        // Nothing inside the lock can leave a Timeline half-updated in a
        // way later readers would misinterpret, so poisoning is ignored.
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Marks the session closed if it has been idle for `timeout`.
    pub(crate) fn close_if_idle(&self, now: Timestamp, timeout: Duration) -> bool {
        let mut timeline = self.timeline();
        if timeline.closed || !timeline.is_idle(now, timeout) {
            return false;
        }
        timeline.closed = true;
        true
    }

    pub(crate) fn close(&self) {
        self.timeline().closed = true;
    }

    /// Both snapshots, in key order. Unset counts as not consenting.
    pub(crate) fn consent(&self) -> [bool; 2] {
        [
            self.snapshots[0].get().unwrap_or(false),
            self.snapshots[1].get().unwrap_or(false),
        ]
    }
}

// ---------------------------------------------------------------------------
// SessionView
// ---------------------------------------------------------------------------

/// A read-only copy of a session's aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub key: SessionKey,
    pub start: Timestamp,
    pub last_damage: Timestamp,
    pub initiator: Option<PlayerId>,
    pub total_hits: usize,
    pub total_damage: f64,
    /// Snapshots for `[key.low(), key.high()]`.
    pub consent: [Option<bool>; 2],
}

impl SessionView {
    pub(crate) fn of(cell: &SessionCell) -> Self {
        let timeline = cell.timeline();
        Self {
            key: cell.key,
            start: timeline.start,
            last_damage: timeline.last_damage,
            initiator: timeline.initiator,
            total_hits: timeline.events.len(),
            total_damage: timeline.total_damage(),
            consent: [cell.snapshots[0].get(), cell.snapshots[1].get()],
        }
    }
}
