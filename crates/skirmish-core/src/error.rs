//! Error types for the match core.
//!
//! Authority and configuration errors are returned to the calling peer only;
//! they are never put on the wire.

use thiserror::Error;

use crate::world::{ConnectionId, NetworkId};

/// A host-only operation was attempted on a non-host peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("Only the host can perform this action: {operation} (local connection {connection})")]
    NotHost {
        operation: &'static str,
        connection: ConnectionId,
    },
}

/// Failures of the staged roster reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    /// No spawn slots are configured, so there is no roster root to reset.
    #[error("Roster root is not configured; roster reset is disabled")]
    MissingRoot,

    /// Player entities were still present when the cleanup budget ran out.
    #[error("Roster cleanup did not finish within {timeout_ms} ms ({remaining} player entities left)")]
    CleanupTimedOut { timeout_ms: u64, remaining: usize },

    #[error("Spawn request from unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Spawn request from connection {0} belongs to a stale reset attempt")]
    StaleAttempt(ConnectionId),

    #[error("No roster reset is waiting for spawn requests")]
    NotAwaitingSpawns,

    /// Every spawn slot is held by a live connection.
    #[error("No free spawn slot for connection {connection} ({slots} slots, all taken)")]
    NoFreeSlot {
        connection: ConnectionId,
        slots: usize,
    },

    /// Fewer players answered the reset than it waits for.
    #[error("Only {spawned} of {required} players spawned within {timeout_ms} ms")]
    RespawnTimedOut {
        timeout_ms: u64,
        spawned: usize,
        required: usize,
    },

    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Failures of host-side unit state changes and commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("Unit {0} not found")]
    NotFound(NetworkId),

    #[error("Unit {0} is dead; further state changes are refused")]
    Terminal(NetworkId),

    #[error("Connection {connection} does not own unit {unit}")]
    NotOwner {
        unit: NetworkId,
        connection: ConnectionId,
    },

    #[error("Unit {0} is busy and cannot take a new path")]
    Busy(NetworkId),

    #[error("Path for unit {0} has no waypoints")]
    EmptyPath(NetworkId),

    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Rejected local turn input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("Turn input is only accepted while playing")]
    NotPlaying,

    #[error("It is not the local player's turn (current player: {current:?})")]
    NotYourTurn { current: Option<NetworkId> },

    #[error("Unit {0} is not owned by the local player")]
    UnitNotOwned(NetworkId),

    #[error("Unit {0} cannot take a path right now")]
    UnitUnavailable(NetworkId),

    #[error("No unit is selected")]
    NoSelection,

    #[error("A path needs at least one point")]
    EmptyPath,

    #[error("The path for unit {0} is still waiting for the host")]
    PathInFlight(NetworkId),
}

/// Wire encoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}

/// Invalid match configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("At least one spawn slot is required")]
    NoSpawnSlots,

    #[error("Tick rate must be greater than zero")]
    ZeroTickRate,

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("min_players ({min_players}) exceeds the number of spawn slots ({slots})")]
    MinPlayersExceedSlots { min_players: usize, slots: usize },
}

/// Any error surfaced by [`crate::session::PeerSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
