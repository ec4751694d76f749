//! Player Sessions
//!
//! Maps each connected player to a bounded outbound channel. Pushes are
//! fire-and-forget: a full or closed channel drops the message, and the
//! next fan-out supersedes it anyway.

use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::mesh::device::PlayerId;
use crate::network::protocol::ServerMessage;

/// Why a push did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// Player has no session.
    #[error("no session")]
    NoSession,

    /// Outbound channel is full.
    #[error("channel full")]
    Full,

    /// Receiver was dropped.
    #[error("channel closed")]
    Closed,
}

/// Counters for pushes since the registry was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    /// Messages handed to a channel.
    pub delivered: u64,
    /// Messages dropped on a full channel.
    pub dropped_full: u64,
    /// Messages dropped on a closed channel.
    pub dropped_closed: u64,
}

/// Connected players and their outbound channels.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
    stats: PushStats,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a player. Replaces any previous channel for that player.
    pub fn connect(&mut self, player: PlayerId, sender: mpsc::Sender<ServerMessage>) {
        if self.sessions.insert(player, sender).is_some() {
            debug!("Player {} reconnected, old channel replaced", player.short());
        } else {
            debug!("Player {} connected", player.short());
        }
    }

    /// Detach a player.
    pub fn disconnect(&mut self, player: PlayerId) -> bool {
        let removed = self.sessions.remove(&player).is_some();
        if removed {
            debug!("Player {} disconnected", player.short());
        }
        removed
    }

    /// Is the player connected?
    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.sessions.contains_key(&player)
    }

    /// Number of connected players.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Push counters.
    pub fn stats(&self) -> PushStats {
        self.stats
    }

    /// Push a message to one player without waiting.
    ///
    /// A closed channel also detaches the player.
    pub fn push(&mut self, player: PlayerId, message: ServerMessage) -> Result<(), PushError> {
        let sender = self.sessions.get(&player).ok_or(PushError::NoSession)?;
        match sender.try_send(message) {
            Ok(()) => {
                self.stats.delivered += 1;
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped_full += 1;
                warn!("Push to {} dropped: channel full", player.short());
                Err(PushError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped_closed += 1;
                warn!("Push to {} dropped: channel closed", player.short());
                self.sessions.remove(&player);
                Err(PushError::Closed)
            }
        }
    }
}
