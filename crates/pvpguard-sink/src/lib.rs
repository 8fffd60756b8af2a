//! Outbound collaborators for pvpguard.
//!
//! The core never talks to the network, the renderer, or the game world
//! directly. It calls the narrow traits defined here, and the host plugs in
//! whatever implementation fits:
//!
//! - [`ReportingSink`]: fire-and-forget structured reports. The shipped
//!   implementation is [`ReportDispatcher`], which queues reports to a
//!   background task that calls an async [`ReportDelivery`].
//! - [`PresentationUpdate`]: re-render a player's PvP badge.
//! - [`WorldMutation`]: kill a player (combat-log punishment).
//! - [`Messaging`]: send a player a message.
//!
//! Every method here is called from the host's event thread, so none of
//! them may block. Anything slow belongs behind a channel.

#![allow(async_fn_in_trait)]

mod delivery;
mod dispatcher;
mod error;

pub use delivery::{ChannelDelivery, LogDelivery, MemorySink};
pub use dispatcher::{DispatchConfig, DispatchStats, ReportDispatcher};
pub use error::SinkError;

use std::future::Future;
use std::sync::Arc;

use pvpguard_protocol::{PlayerBadge, PlayerId, Report};

/// Accepts structured reports without blocking the caller.
pub trait ReportingSink: Send + Sync + 'static {
    /// Hands a report off for delivery. Must return immediately.
    fn emit(&self, report: Report);
}

/// Performs the actual (possibly slow) delivery of one report.
///
/// Runs on the dispatcher's background task, never on the event thread.
/// The returned future must be `Send` because Tokio may move the worker
/// between threads.
pub trait ReportDelivery: Send + Sync + 'static {
    fn deliver(
        &self,
        report: &Report,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Re-renders a player's badge in the tab list and above their nametag.
pub trait PresentationUpdate: Send + Sync + 'static {
    fn refresh(&self, player: PlayerId, badge: &PlayerBadge);
}

/// Mutates the game world on behalf of the core.
pub trait WorldMutation: Send + Sync + 'static {
    /// Kills the player, dropping their inventory where they stand.
    fn kill(&self, player: PlayerId);
}

/// Sends a chat message to a single player.
pub trait Messaging: Send + Sync + 'static {
    fn notify(&self, player: PlayerId, text: &str);
}

impl<T: ReportingSink> ReportingSink for Arc<T> {
    fn emit(&self, report: Report) {
        (**self).emit(report);
    }
}

impl<T: PresentationUpdate> PresentationUpdate for Arc<T> {
    fn refresh(&self, player: PlayerId, badge: &PlayerBadge) {
        (**self).refresh(player, badge);
    }
}

impl<T: WorldMutation> WorldMutation for Arc<T> {
    fn kill(&self, player: PlayerId) {
        (**self).kill(player);
    }
}

impl<T: Messaging> Messaging for Arc<T> {
    fn notify(&self, player: PlayerId, text: &str) {
        (**self).notify(player, text);
    }
}

// ---------------------------------------------------------------------------
// Null collaborators
// ---------------------------------------------------------------------------

/// A collaborator that ignores every call.
///
/// Handy for hosts that have no renderer or no chat, and for tests that
/// only care about reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ReportingSink for Discard {
    fn emit(&self, _report: Report) {}
}

impl PresentationUpdate for Discard {
    fn refresh(&self, _player: PlayerId, _badge: &PlayerBadge) {}
}

impl WorldMutation for Discard {
    fn kill(&self, _player: PlayerId) {}
}

impl Messaging for Discard {
    fn notify(&self, _player: PlayerId, _text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvpguard_protocol::{PlayerRef, StatusChange, StatusChangeReport, Timestamp};

    fn report() -> Report {
        Report::StatusChange(StatusChangeReport {
            timestamp: Timestamp(1),
            player: PlayerRef { id: PlayerId(1), username: None },
            change: StatusChange::PvpEnabled,
        })
    }

    #[test]
    fn test_arc_sink_forwards_to_inner() {
        let sink = Arc::new(MemorySink::new());
        let shared: Arc<dyn ReportingSink> = Arc::new(Arc::clone(&sink));

        shared.emit(report());

        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_discard_accepts_everything() {
        // Nothing to observe; this just pins down that Discard is usable
        // behind every collaborator trait object.
        let sink: Arc<dyn ReportingSink> = Arc::new(Discard);
        let world: Arc<dyn WorldMutation> = Arc::new(Discard);
        let chat: Arc<dyn Messaging> = Arc::new(Discard);
        sink.emit(report());
        world.kill(PlayerId(1));
        chat.notify(PlayerId(1), "hello");
    }
}
