//! Fixed-step session tick.

use bevy::prelude::*;

use crate::bevy::{SessionEventMessage, SessionRes};

/// Ticks the session with the fixed clock and forwards its events.
pub fn tick_session(
    time: Res<Time<Fixed>>,
    mut session: ResMut<SessionRes>,
    mut events: MessageWriter<SessionEventMessage>,
) {
    let session = &mut session.session;
    if let Err(err) = session.tick(time.elapsed()) {
        tracing::error!("[session] Tick failed: {}", err);
    }
    for event in session.drain_events() {
        events.write(SessionEventMessage(event));
    }
}
