//! Skirmish Core Library
//!
//! Match lifecycle and host-authoritative state replication for a small
//! turn-based RTS played peer-to-peer.
//!
//! One peer (the host) owns every replicated value. The others mirror what it
//! writes and send commands back. [`session::PeerSession`] ties the pieces
//! together for one peer; [`bevy::SkirmishPlugin`] runs a session inside a
//! headless Bevy app.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod authority;
pub mod config;
pub mod countdown;
pub mod error;
pub mod events;
pub mod phase;
pub mod protocol;
pub mod registry;
pub mod replicated;
pub mod roster;
pub mod session;
pub mod transport;
pub mod turn;
pub mod unit;
pub mod world;

// Bevy integration
pub mod bevy;

pub use authority::AuthorityContext;
pub use config::{MatchConfig, SpawnSlot};
pub use error::{
    AuthorityError, ConfigError, ProtocolError, RosterError, SessionError, TurnError, UnitError,
};
pub use events::{CameraIntent, SessionEvent};
pub use phase::{MatchOutcome, MatchPhase, Transition};
pub use protocol::NetMessage;
pub use replicated::{Replicated, ValueChange};
pub use roster::{RosterProgress, RosterResetProtocol, RosterRun};
pub use session::PeerSession;
pub use transport::{LoopbackEndpoint, LoopbackHub, Transport};
pub use turn::TurnPhase;
pub use unit::{UnitState, VisualCue};
pub use world::{Color, ConnectionId, NetworkId, TeamId, World};
