//! Host event dispatch.
//!
//! Game engines deliver damage, joins, quits and commands through their own
//! callback systems. The host adapter translates each callback into a
//! [`HostEvent`] and hands it to an [`EventDispatcher`]; everything
//! registered there sees every event in registration order.

use std::sync::Arc;

use pvpguard_combat::Hit;
use pvpguard_protocol::{Location, PlayerId, PlayerStatus, Timestamp};

/// A damage event between two players.
pub type DamageEvent = Hit;

/// The two forms of the consent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentCommand {
    On,
    Off,
}

impl std::str::FromStr for ConsentCommand {
    type Err = pvpguard_protocol::ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(pvpguard_protocol::ProtocolError::InvalidValue(format!(
                "expected `on` or `off`, got `{other}`"
            ))),
        }
    }
}

/// Everything the host reports to pvpguard.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Damage(DamageEvent),
    Join {
        player: PlayerId,
        username: String,
        at: Timestamp,
    },
    Quit {
        player: PlayerId,
        location: Option<Location>,
        at: Timestamp,
    },
    Death {
        player: PlayerId,
        /// The player who landed the killing blow, if any.
        killer: Option<PlayerId>,
        at: Timestamp,
    },
    ConsentCommand {
        player: PlayerId,
        command: ConsentCommand,
        at: Timestamp,
    },
    StatusCommand {
        player: PlayerId,
        status: PlayerStatus,
        at: Timestamp,
    },
}

impl HostEvent {
    /// The player the event is about. For damage, the victim.
    pub fn player(&self) -> PlayerId {
        match self {
            Self::Damage(hit) => hit.victim,
            Self::Join { player, .. }
            | Self::Quit { player, .. }
            | Self::Death { player, .. }
            | Self::ConsentCommand { player, .. }
            | Self::StatusCommand { player, .. } => *player,
        }
    }
}

/// Something that reacts to host events.
///
/// Called on the host's event thread. Implementations must not block.
pub trait HostEventHandler: Send + Sync + 'static {
    fn handle(&self, event: &HostEvent);
}

/// Fans host events out to every registered handler.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn HostEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn HostEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: &HostEvent) {
        tracing::trace!(player_id = %event.player(), handlers = self.handlers.len(), "dispatching host event");
        for handler in &self.handlers {
            handler.handle(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").field("handlers", &self.handlers.len()).finish()
    }
}
