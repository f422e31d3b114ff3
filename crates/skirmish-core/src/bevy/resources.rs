//! ECS resources wrapping the session.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::events::SessionEvent;
use crate::phase::{MatchOutcome, MatchPhase};
use crate::session::PeerSession;
use crate::turn::TurnPhase;
use crate::world::{Color, ConnectionId, NetworkId, TeamId};

/// Maximum number of session events kept for UI polling.
const MAX_RECENT_EVENTS: usize = 64;

/// The peer session driven by the fixed-step schedule.
#[derive(Resource, Debug)]
pub struct SessionRes {
    pub session: PeerSession,
}

impl SessionRes {
    pub fn new(session: PeerSession) -> Self {
        Self { session }
    }
}

/// Input from outside the ECS (lobby UI, input handling, transport events).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetAllReady(bool),
    SeedLobby {
        connection: ConnectionId,
        color: Color,
        team: TeamId,
    },
    StartMatch,
    RequestRematch,
    SelectUnit(NetworkId),
    ConfirmPath(Vec<[f32; 2]>),
    ConnectionOpened(ConnectionId),
    ConnectionClosed(ConnectionId),
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetAllReady(_) => "SetAllReady",
            Self::SeedLobby { .. } => "SeedLobby",
            Self::StartMatch => "StartMatch",
            Self::RequestRematch => "RequestRematch",
            Self::SelectUnit(_) => "SelectUnit",
            Self::ConfirmPath(_) => "ConfirmPath",
            Self::ConnectionOpened(_) => "ConnectionOpened",
            Self::ConnectionClosed(_) => "ConnectionClosed",
        }
    }
}

/// Shared command queue, cloned into whoever produces commands.
#[derive(Resource, Clone, Default)]
pub struct SessionCommandQueue {
    inner: Arc<Mutex<VecDeque<SessionCommand>>>,
}

impl SessionCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: SessionCommand) {
        self.inner.lock().push_back(command);
    }

    pub fn drain(&self) -> Vec<SessionCommand> {
        self.inner.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Snapshot of the session for polling from outside the ECS.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchSummary {
    pub phase: MatchPhase,
    pub turn_phase: TurnPhase,
    pub current_player: Option<NetworkId>,
    pub local_player: Option<NetworkId>,
    pub selected_unit: Option<NetworkId>,
    pub countdown_remaining_ms: Option<u64>,
    pub outcome: Option<MatchOutcome>,
    pub players: usize,
    pub units: usize,
}

/// Latest [`MatchSummary`] plus a bounded log of recent session events.
#[derive(Resource, Clone, Default)]
pub struct MatchStore {
    summary: Arc<RwLock<MatchSummary>>,
    recent: Arc<RwLock<VecDeque<SessionEvent>>>,
}

impl MatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> MatchSummary {
        self.summary.read().clone()
    }

    pub fn set_summary(&self, summary: MatchSummary) {
        let mut guard = self.summary.write();
        if *guard != summary {
            *guard = summary;
        }
    }

    pub fn push_event(&self, event: SessionEvent) {
        let mut recent = self.recent.write();
        if recent.len() >= MAX_RECENT_EVENTS {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    pub fn recent_events(&self) -> Vec<SessionEvent> {
        self.recent.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_queue_drains_in_order() {
        let queue = SessionCommandQueue::new();
        let producer = queue.clone();
        producer.push(SessionCommand::SetAllReady(true));
        producer.push(SessionCommand::SelectUnit(7));

        assert_eq!(
            queue.drain(),
            vec![SessionCommand::SetAllReady(true), SessionCommand::SelectUnit(7)]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_recent_events_are_bounded() {
        let store = MatchStore::new();
        for _ in 0..MAX_RECENT_EVENTS + 5 {
            store.push_event(SessionEvent::CountdownCancelled);
        }
        store.push_event(SessionEvent::ClearLobbyReady);

        let recent = store.recent_events();
        assert_eq!(recent.len(), MAX_RECENT_EVENTS);
        assert_eq!(recent.last(), Some(&SessionEvent::ClearLobbyReady));
    }
}
