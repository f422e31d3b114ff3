//! State synchronization systems.
//!
//! Copies session state into the [`MatchStore`] for UI polling.

use bevy::prelude::*;

use crate::bevy::{MatchStore, MatchSummary, SessionEventMessage, SessionRes};

pub fn sync_match_store(session: Res<SessionRes>, store: Res<MatchStore>) {
    let session = &session.session;
    #[allow(clippy::cast_possible_truncation)]
    let countdown_remaining_ms = session
        .countdown_remaining()
        .map(|d| d.as_millis() as u64);

    store.set_summary(MatchSummary {
        phase: session.current_phase(),
        turn_phase: session.turn_phase(),
        current_player: session.current_player(),
        local_player: session.local_player(),
        selected_unit: session.selected_unit(),
        countdown_remaining_ms,
        outcome: session.outcome(),
        players: session.world().players.len(),
        units: session.world().units.len(),
    });
}

pub fn record_session_events(
    mut events: MessageReader<SessionEventMessage>,
    store: Res<MatchStore>,
) {
    for SessionEventMessage(event) in events.read() {
        store.push_event(event.clone());
    }
}
