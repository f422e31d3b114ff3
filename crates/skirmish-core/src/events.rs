//! Intents for the collaborators around the core (rendering, camera, lobby
//! UI). The core never renders; it only says what should happen.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RosterError;
use crate::phase::{MatchOutcome, MatchPhase};
use crate::turn::TurnPhase;
use crate::unit::VisualCue;
use crate::world::{Color, NetworkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraIntent {
    Lobby,
    Gameplay,
    Results,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseExited(MatchPhase),
    PhaseEntered(MatchPhase),
    Camera(CameraIntent),
    /// The lobby should drop its "ready" flag for this peer.
    ClearLobbyReady,
    TurnPhaseChanged {
        phase: TurnPhase,
        current_player: Option<NetworkId>,
    },
    UnitVisual {
        unit: NetworkId,
        cue: VisualCue,
    },
    UnitTinted {
        unit: NetworkId,
        player: NetworkId,
        color: Color,
    },
    /// The host refused the local player's path; pick a unit again.
    PathRejected {
        unit: NetworkId,
    },
    MatchOutcome(MatchOutcome),
    CountdownStarted {
        deadline: Duration,
    },
    CountdownCancelled,
    RosterResetFailed(RosterError),
}
