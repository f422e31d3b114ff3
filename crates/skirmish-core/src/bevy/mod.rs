//! Bevy integration for the match core.
//!
//! `SkirmishPlugin` runs one [`crate::session::PeerSession`] inside a
//! headless app: queued commands in, session events out as messages, and a
//! polled [`MatchStore`] for UI code.

pub mod events;
pub mod plugin;
pub mod resources;
pub mod systems;

#[cfg(test)]
pub(crate) mod test_utils;

pub use events::*;
pub use plugin::SkirmishPlugin;
pub use resources::*;
