//! Per-peer turn flow inside the Playing phase.
//!
//! Nothing here is replicated. Every peer walks the same turn order (player
//! ids sorted by network id) and advances when the current player's unit is
//! seen starting a path. A confirmed local path only moves the turn on once
//! the host has accepted it; a refusal hands the turn back for another pick.

use serde::{Deserialize, Serialize};

use crate::error::TurnError;
use crate::world::{NetworkId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TurnPhase {
    #[default]
    Inactive,
    SelectingUnit,
    DrawingPath,
    AwaitingOthers,
}

/// A confirmed path, waiting for the host to accept it.
#[derive(Debug, Clone, PartialEq)]
pub struct PathIntent {
    pub unit: NetworkId,
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Default)]
pub struct LocalTurnPhaseController {
    phase: TurnPhase,
    local_player: Option<NetworkId>,
    order: Vec<NetworkId>,
    turn_index: usize,
    selected: Option<NetworkId>,
    /// Unit whose confirmed path the host has not answered yet.
    submitted: Option<NetworkId>,
}

impl LocalTurnPhaseController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to Inactive with index 0 and nothing selected.
    pub fn reset(&mut self) {
        self.phase = TurnPhase::Inactive;
        self.local_player = None;
        self.order.clear();
        self.turn_index = 0;
        self.selected = None;
        self.submitted = None;
    }

    /// Starts the turn flow at index 0.
    pub fn begin(&mut self, local_player: Option<NetworkId>, order: Vec<NetworkId>) -> TurnPhase {
        self.local_player = local_player;
        self.order = order;
        self.turn_index = 0;
        self.selected = None;
        self.submitted = None;
        self.refresh();
        tracing::info!(
            "[turn] Turn order {:?}, local player {:?}, phase {:?}",
            self.order,
            self.local_player,
            self.phase
        );
        self.phase
    }

    /// Updates the turn order after players left mid-match.
    pub fn sync_roster(&mut self, order: Vec<NetworkId>) {
        if self.phase == TurnPhase::Inactive || order == self.order {
            return;
        }
        let current = self.current_player();
        self.order = order;
        self.turn_index = current
            .and_then(|p| self.order.iter().position(|id| *id == p))
            .unwrap_or_else(|| self.turn_index.min(self.order.len().saturating_sub(1)));
        if self.local_player.is_some_and(|p| !self.order.contains(&p)) {
            self.local_player = None;
        }
        if !self.is_local_turn() {
            self.selected = None;
            self.submitted = None;
        }
        self.refresh();
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    pub fn local_player(&self) -> Option<NetworkId> {
        self.local_player
    }

    pub fn selected_unit(&self) -> Option<NetworkId> {
        self.selected
    }

    /// Unit whose path is on its way to the host.
    pub fn path_in_flight(&self) -> Option<NetworkId> {
        self.submitted
    }

    pub fn current_player(&self) -> Option<NetworkId> {
        if self.phase == TurnPhase::Inactive {
            return None;
        }
        self.order.get(self.turn_index).copied()
    }

    pub fn is_local_turn(&self) -> bool {
        self.local_player.is_some() && self.current_player() == self.local_player
    }

    /// Picks one of the local player's units for the next path.
    pub fn select_unit(&mut self, world: &World, unit: NetworkId) -> Result<(), TurnError> {
        self.check_local_turn()?;
        if let Some(pending) = self.submitted {
            return Err(TurnError::PathInFlight(pending));
        }

        let entity = world.units.get(&unit).ok_or(TurnError::UnitNotOwned(unit))?;
        if Some(*entity.owner.get()) != self.local_player {
            return Err(TurnError::UnitNotOwned(unit));
        }
        if !entity.state.get().accepts_path() {
            return Err(TurnError::UnitUnavailable(unit));
        }

        self.selected = Some(unit);
        self.phase = TurnPhase::DrawingPath;
        tracing::debug!("[turn] Selected unit {}", unit);
        Ok(())
    }

    /// Confirms the drawn path. The turn stays with the local player until
    /// the host either starts the path or refuses it.
    pub fn confirm_path(&mut self, points: Vec<[f32; 2]>) -> Result<PathIntent, TurnError> {
        self.check_local_turn()?;
        if let Some(pending) = self.submitted {
            return Err(TurnError::PathInFlight(pending));
        }
        let unit = self.selected.ok_or(TurnError::NoSelection)?;
        if points.is_empty() {
            return Err(TurnError::EmptyPath);
        }

        self.submitted = Some(unit);
        Ok(PathIntent { unit, points })
    }

    /// A unit of `owner` started following a path. Advances the turn when
    /// `owner` is the current player and either remote or waiting on its own
    /// confirmed path. Returns whether the turn advanced.
    pub fn observe_path_started(&mut self, owner: NetworkId) -> bool {
        if self.current_player() != Some(owner) {
            return false;
        }
        let waiting = match self.phase {
            TurnPhase::AwaitingOthers => true,
            TurnPhase::SelectingUnit | TurnPhase::DrawingPath => self.submitted.is_some(),
            TurnPhase::Inactive => false,
        };
        if !waiting {
            return false;
        }
        tracing::debug!("[turn] Player {} moved", owner);
        self.advance();
        true
    }

    /// The host refused the path confirmed for `unit`. The local player
    /// keeps the turn and picks again. Returns whether anything changed.
    pub fn path_rejected(&mut self, unit: NetworkId) -> bool {
        if self.submitted != Some(unit) {
            return false;
        }
        tracing::info!("[turn] Path for unit {} refused, selecting again", unit);
        self.submitted = None;
        self.selected = None;
        self.refresh();
        true
    }

    fn check_local_turn(&self) -> Result<(), TurnError> {
        match self.phase {
            TurnPhase::Inactive => Err(TurnError::NotPlaying),
            TurnPhase::AwaitingOthers => Err(TurnError::NotYourTurn {
                current: self.current_player(),
            }),
            TurnPhase::SelectingUnit | TurnPhase::DrawingPath => Ok(()),
        }
    }

    fn advance(&mut self) {
        if !self.order.is_empty() {
            self.turn_index = (self.turn_index + 1) % self.order.len();
        }
        self.selected = None;
        self.submitted = None;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.phase = match self.order.get(self.turn_index) {
            None => TurnPhase::Inactive,
            Some(current) if Some(*current) == self.local_player => TurnPhase::SelectingUnit,
            Some(_) => TurnPhase::AwaitingOthers,
        };
    }
}
