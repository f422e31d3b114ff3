//! ECS messages emitted by the session systems.
//!
//! Note: In Bevy 0.18+, buffered events use the Message trait instead of Event.

use bevy::prelude::*;

use crate::events::SessionEvent;

/// A session event forwarded into the ECS for rendering, camera and lobby
/// systems to react to.
#[derive(Message, Debug, Clone, PartialEq)]
pub struct SessionEventMessage(pub SessionEvent);

/// A queued command the session refused.
#[derive(Message, Debug, Clone, PartialEq)]
pub struct CommandRejected {
    pub command: &'static str,
    pub reason: String,
}
