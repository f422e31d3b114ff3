//! Bevy plugin running a [`PeerSession`] headlessly.
//!
//! The session ticks once per `FixedUpdate` at the configured tick rate.
//! Commands are applied right before the tick; events come out as
//! [`SessionEventMessage`]s right after it.

use bevy::prelude::*;
use parking_lot::Mutex;

use crate::bevy::events::*;
use crate::bevy::resources::*;
use crate::bevy::systems;
use crate::session::PeerSession;

/// Headless plugin owning one peer session.
///
/// Rendering, camera and lobby UI live outside this plugin and react to
/// [`SessionEventMessage`] or poll the [`MatchStore`].
pub struct SkirmishPlugin {
    /// Moved into the app on build.
    session: Mutex<Option<PeerSession>>,
    pub command_queue: Option<SessionCommandQueue>,
    pub match_store: Option<MatchStore>,
}

impl SkirmishPlugin {
    pub fn new(session: PeerSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            command_queue: None,
            match_store: None,
        }
    }

    pub fn with_command_queue(mut self, queue: SessionCommandQueue) -> Self {
        self.command_queue = Some(queue);
        self
    }

    pub fn with_match_store(mut self, store: MatchStore) -> Self {
        self.match_store = Some(store);
        self
    }
}

impl Plugin for SkirmishPlugin {
    fn build(&self, app: &mut App) {
        let Some(session) = self.session.lock().take() else {
            tracing::error!("[plugin] Session already moved into another app");
            return;
        };

        app.insert_resource(Time::<Fixed>::from_seconds(
            session.config().tick_duration().as_secs_f64(),
        ));

        app.insert_resource(self.command_queue.clone().unwrap_or_default())
            .insert_resource(self.match_store.clone().unwrap_or_default())
            .insert_resource(SessionRes::new(session));

        app.add_message::<SessionEventMessage>()
            .add_message::<CommandRejected>();

        app.add_systems(
            FixedUpdate,
            (systems::process_session_commands, systems::tick_session).chain(),
        );
        app.add_systems(
            PostUpdate,
            (systems::record_session_events, systems::sync_match_store).chain(),
        );
    }
}
