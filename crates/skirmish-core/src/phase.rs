//! Match phase controller.
//!
//! One replicated [`MatchPhase`] per session. Only the host moves it forward;
//! every peer (host included) reacts to each observed change by running
//! `on_exit(previous)` and then `on_enter(next)`. Both hooks are idempotent,
//! so a change that is observed twice has no extra effect.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::authority::AuthorityContext;
use crate::error::AuthorityError;
use crate::events::{CameraIntent, SessionEvent};
use crate::replicated::Replicated;
use crate::turn::LocalTurnPhaseController;
use crate::world::{ConnectionId, NetworkId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    #[default]
    WaitingForPlayers,
    GameStart,
    Playing,
    GameOver,
}

impl MatchPhase {
    /// Edges of the phase machine.
    pub const fn can_follow(self, next: MatchPhase) -> bool {
        matches!(
            (self, next),
            (Self::WaitingForPlayers, Self::GameStart)
                | (Self::GameStart, Self::Playing)
                // A reset that never got its players back.
                | (Self::GameStart, Self::WaitingForPlayers)
                | (Self::Playing, Self::GameOver)
                | (Self::GameOver, Self::WaitingForPlayers)
        )
    }
}

/// Final result of a match, decided by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Winner {
        player: NetworkId,
        connection: ConnectionId,
    },
    Draw,
}

/// Result of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Already in the requested phase.
    Unchanged,
    /// Held back until the running roster reset settles.
    Deferred,
    /// Not an edge of the phase machine.
    Rejected,
}

/// Everything the phase hooks touch on this peer.
pub struct PhaseHooks<'a> {
    pub world: &'a mut World,
    pub turn: &'a mut LocalTurnPhaseController,
    pub events: &'a mut Vec<SessionEvent>,
    pub now: Duration,
    pub production_interval: Duration,
}

/// Picks the winner from host-local base state.
///
/// The owner of the only standing base wins. No standing base, or standing
/// bases with different owners, is a draw.
pub fn determine_winner(world: &World) -> MatchOutcome {
    let owners: BTreeSet<NetworkId> = world
        .bases
        .values()
        .filter(|b| b.is_alive())
        .filter_map(|b| *b.owner.get())
        .collect();

    let mut owners = owners.into_iter();
    match (owners.next(), owners.next()) {
        (Some(player), None) => match world.players.get(&player) {
            Some(entity) => MatchOutcome::Winner {
                player,
                connection: entity.connection,
            },
            None => MatchOutcome::Draw,
        },
        _ => MatchOutcome::Draw,
    }
}

#[derive(Debug)]
pub struct MatchPhaseController {
    authority: AuthorityContext,
    phase: Replicated<MatchPhase>,
    /// Phase whose `on_enter` ran last and whose `on_exit` has not run yet.
    active: Option<MatchPhase>,
    deferred: Option<MatchPhase>,
    outcome: Option<MatchOutcome>,
}

impl MatchPhaseController {
    pub fn new(authority: AuthorityContext) -> Self {
        Self {
            phase: Replicated::new(MatchPhase::WaitingForPlayers, &authority),
            authority,
            active: Some(MatchPhase::WaitingForPlayers),
            deferred: None,
            outcome: None,
        }
    }

    pub fn current_phase(&self) -> MatchPhase {
        *self.phase.get()
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    /// Host-only transition.
    ///
    /// While a roster reset is in flight the request is parked and handed back
    /// by [`Self::take_deferred`] once the reset settles.
    pub fn request_transition(
        &mut self,
        next: MatchPhase,
        reset_in_flight: bool,
    ) -> Result<Transition, AuthorityError> {
        self.authority.ensure_authority("request phase transition")?;
        if next == self.current_phase() {
            return Ok(Transition::Unchanged);
        }
        if reset_in_flight {
            tracing::info!("[phase] Deferring {:?} until the roster reset settles", next);
            self.deferred = Some(next);
            return Ok(Transition::Deferred);
        }
        self.write(next)
    }

    /// Transition performed by the roster reset itself; never deferred.
    pub fn complete_reset(&mut self, next: MatchPhase) -> Result<Transition, AuthorityError> {
        self.authority.ensure_authority("complete roster reset")?;
        if next == self.current_phase() {
            return Ok(Transition::Unchanged);
        }
        self.write(next)
    }

    pub fn take_deferred(&mut self) -> Option<MatchPhase> {
        self.deferred.take()
    }

    fn write(&mut self, next: MatchPhase) -> Result<Transition, AuthorityError> {
        let current = self.current_phase();
        if !current.can_follow(next) {
            tracing::warn!("[phase] Rejecting {:?} -> {:?}", current, next);
            return Ok(Transition::Rejected);
        }
        self.phase.set(next)?;
        tracing::info!("[phase] {:?} -> {:?}", current, next);
        Ok(Transition::Applied)
    }

    /// Runs the hooks for every phase change observed since the last call.
    ///
    /// Returns the outcome the host has to broadcast, if GameOver was entered.
    pub fn dispatch(&mut self, hooks: &mut PhaseHooks<'_>) -> Option<MatchOutcome> {
        let mut decided = None;
        for change in self.phase.drain_changes() {
            self.on_exit(change.previous, hooks);
            if let Some(outcome) = self.on_enter(change.next, hooks) {
                decided = Some(outcome);
            }
        }
        decided
    }

    pub fn on_exit(&mut self, previous: MatchPhase, hooks: &mut PhaseHooks<'_>) {
        if self.active != Some(previous) {
            return;
        }
        self.active = None;

        if previous == MatchPhase::Playing {
            hooks.turn.reset();
            for base in hooks.world.bases.values_mut() {
                base.production_enabled = false;
                base.next_production = None;
            }
        }
        hooks.events.push(SessionEvent::PhaseExited(previous));
    }

    pub fn on_enter(&mut self, next: MatchPhase, hooks: &mut PhaseHooks<'_>) -> Option<MatchOutcome> {
        if self.active == Some(next) {
            return None;
        }
        self.active = Some(next);
        hooks.events.push(SessionEvent::PhaseEntered(next));

        match next {
            MatchPhase::WaitingForPlayers => {
                self.outcome = None;
                hooks.events.push(SessionEvent::Camera(CameraIntent::Lobby));
                None
            }
            MatchPhase::GameStart => None,
            MatchPhase::Playing => {
                self.enter_playing(hooks);
                None
            }
            MatchPhase::GameOver => {
                hooks.events.push(SessionEvent::Camera(CameraIntent::Results));
                if !self.authority.is_authority {
                    return None;
                }
                let outcome = determine_winner(hooks.world);
                tracing::info!("[phase] Match decided: {:?}", outcome);
                self.record_outcome(outcome, hooks.events);
                Some(outcome)
            }
        }
    }

    fn enter_playing(&mut self, hooks: &mut PhaseHooks<'_>) {
        let local_player = hooks
            .world
            .player_by_connection(self.authority.local_connection)
            .map(|p| p.id);
        if local_player.is_none() {
            tracing::warn!(
                "[phase] No local player for connection {}",
                self.authority.local_connection
            );
        }

        hooks.turn.begin(local_player, hooks.world.player_order());

        let first_production = hooks.now + hooks.production_interval;
        let is_host = self.authority.is_authority;
        for base in hooks.world.bases.values_mut() {
            base.production_enabled = true;
            base.next_production = is_host.then_some(first_production);
        }

        hooks.events.push(SessionEvent::Camera(CameraIntent::Gameplay));
        hooks.events.push(SessionEvent::ClearLobbyReady);
    }

    /// Stores the outcome once; later copies are ignored.
    pub fn record_outcome(&mut self, outcome: MatchOutcome, events: &mut Vec<SessionEvent>) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        events.push(SessionEvent::MatchOutcome(outcome));
        true
    }

    pub(crate) fn replica_mut(&mut self) -> &mut Replicated<MatchPhase> {
        &mut self.phase
    }
}
