//! Command processing system.
//!
//! Applies commands queued from outside the ECS to the session.

use bevy::prelude::*;

use crate::bevy::{CommandRejected, SessionCommand, SessionCommandQueue, SessionRes};
use crate::error::SessionError;
use crate::session::PeerSession;

/// Applies every queued command before the session ticks.
///
/// Commands the session refuses are logged and reported as
/// [`CommandRejected`]; they never stop the remaining commands.
pub fn process_session_commands(
    queue: Res<SessionCommandQueue>,
    mut session: ResMut<SessionRes>,
    mut rejected: MessageWriter<CommandRejected>,
) {
    for command in queue.drain() {
        let name = command.name();
        tracing::debug!("[command] {}", name);
        if let Err(err) = apply(&mut session.session, command) {
            tracing::warn!("[command] {} rejected: {}", name, err);
            rejected.write(CommandRejected {
                command: name,
                reason: err.to_string(),
            });
        }
    }
}

fn apply(session: &mut PeerSession, command: SessionCommand) -> Result<(), SessionError> {
    match command {
        SessionCommand::SetAllReady(ready) => session.set_all_ready(ready),
        SessionCommand::SeedLobby {
            connection,
            color,
            team,
        } => Ok(session.seed_lobby_assignments(connection, color, team)?),
        SessionCommand::StartMatch => session.start_match().map(|_| ()),
        SessionCommand::RequestRematch => session.request_rematch().map(|_| ()),
        SessionCommand::SelectUnit(unit) => session.select_unit(unit),
        SessionCommand::ConfirmPath(points) => session.confirm_path(points),
        SessionCommand::ConnectionOpened(connection) => session.on_connection_opened(connection),
        SessionCommand::ConnectionClosed(connection) => session.on_connection_closed(connection),
    }
}
