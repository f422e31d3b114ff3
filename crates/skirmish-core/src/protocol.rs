//! Wire messages between peers.
//!
//! Replicated-field messages carry the host's write version so receivers can
//! drop stale frames. Encoding is postcard.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::phase::{MatchOutcome, MatchPhase};
use crate::replicated::ReplicaVersion;
use crate::unit::UnitState;
use crate::world::{Color, ConnectionId, NetworkId, TeamId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetMessage {
    // Host -> peers: replicated session state.
    PhaseReplicated {
        version: ReplicaVersion,
        phase: MatchPhase,
    },
    DeadlineReplicated {
        version: ReplicaVersion,
        deadline: Option<Duration>,
    },

    // Host -> peers: entity lifecycle and fields.
    PlayerSpawned {
        id: NetworkId,
        connection: ConnectionId,
        slot: usize,
        color: Color,
        team: TeamId,
    },
    PlayerDespawned {
        id: NetworkId,
    },
    PlayerAttributes {
        id: NetworkId,
        color: Option<(ReplicaVersion, Color)>,
        team: Option<(ReplicaVersion, TeamId)>,
    },
    BaseOwner {
        id: NetworkId,
        version: ReplicaVersion,
        owner: Option<NetworkId>,
    },
    BaseHealth {
        id: NetworkId,
        version: ReplicaVersion,
        health: u32,
    },
    UnitSpawned {
        id: NetworkId,
        owner: NetworkId,
        position: [f32; 2],
    },
    UnitOwner {
        id: NetworkId,
        version: ReplicaVersion,
        owner: NetworkId,
    },
    UnitState {
        id: NetworkId,
        version: ReplicaVersion,
        state: UnitState,
    },
    UnitTransform {
        id: NetworkId,
        version: ReplicaVersion,
        position: [f32; 2],
    },
    UnitDespawned {
        id: NetworkId,
    },

    // Roster reset handshake.
    ResetAndRequestSpawn {
        attempt: Uuid,
    },
    SpawnRequest {
        attempt: Uuid,
    },

    // Peer -> host command.
    PathCommand {
        unit: NetworkId,
        points: Vec<[f32; 2]>,
    },
    /// Host -> issuing peer: the path command was refused and the turn stays
    /// with that peer.
    PathRejected {
        unit: NetworkId,
    },

    /// One-shot result of the match.
    MatchOutcome(MatchOutcome),
}

impl NetMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        postcard::to_allocvec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        postcard::from_bytes(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Messages only the host may send.
    pub fn is_host_origin(&self) -> bool {
        !matches!(self, Self::SpawnRequest { .. } | Self::PathCommand { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PhaseReplicated { .. } => "PhaseReplicated",
            Self::DeadlineReplicated { .. } => "DeadlineReplicated",
            Self::PlayerSpawned { .. } => "PlayerSpawned",
            Self::PlayerDespawned { .. } => "PlayerDespawned",
            Self::PlayerAttributes { .. } => "PlayerAttributes",
            Self::BaseOwner { .. } => "BaseOwner",
            Self::BaseHealth { .. } => "BaseHealth",
            Self::UnitSpawned { .. } => "UnitSpawned",
            Self::UnitOwner { .. } => "UnitOwner",
            Self::UnitState { .. } => "UnitState",
            Self::UnitTransform { .. } => "UnitTransform",
            Self::UnitDespawned { .. } => "UnitDespawned",
            Self::ResetAndRequestSpawn { .. } => "ResetAndRequestSpawn",
            Self::SpawnRequest { .. } => "SpawnRequest",
            Self::PathCommand { .. } => "PathCommand",
            Self::PathRejected { .. } => "PathRejected",
            Self::MatchOutcome(_) => "MatchOutcome",
        }
    }
}
