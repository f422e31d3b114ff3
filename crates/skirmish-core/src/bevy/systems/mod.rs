//! Systems driving the session.
//!
//! - command: queued command processing
//! - simulation: fixed-step session tick
//! - state_sync: session state to the shared store

pub mod command;
pub mod simulation;
pub mod state_sync;

pub use command::*;
pub use simulation::*;
pub use state_sync::*;
