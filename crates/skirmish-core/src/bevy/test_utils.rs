//! Test utilities for headless Bevy integration tests.
//!
//! Provides `TestPeers`: one `App` per peer, built from `MinimalPlugins` and
//! `SkirmishPlugin`, all wired to the same loopback and stepped in lockstep.

use bevy::prelude::*;

use crate::bevy::plugin::SkirmishPlugin;
use crate::bevy::resources::{MatchStore, SessionCommand, SessionCommandQueue};
use crate::bevy::{CommandRejected, SessionEventMessage};
use crate::config::MatchConfig;
use crate::session::PeerSession;
use crate::transport::LoopbackHub;
use crate::world::ConnectionId;

/// Messages of type `M` seen by a test app, oldest first.
#[derive(Resource)]
pub(crate) struct MessageLog<M: Message>(pub Vec<M>);

impl<M: Message> Default for MessageLog<M> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

fn collect_messages<M: Message + Clone>(
    mut reader: MessageReader<M>,
    mut log: ResMut<MessageLog<M>>,
) {
    log.0.extend(reader.read().cloned());
}

/// Headless apps for a host and its clients.
///
/// The first connection is the host. Each step advances every app by exactly
/// one fixed tick, host first.
pub(crate) struct TestPeers {
    pub hub: LoopbackHub,
    pub apps: Vec<App>,
}

impl TestPeers {
    pub fn new(connections: &[ConnectionId]) -> Self {
        let config = MatchConfig {
            tick_rate: 10,
            ..MatchConfig::default()
        };
        Self::with_config(connections, &config)
    }

    pub fn with_config(connections: &[ConnectionId], config: &MatchConfig) -> Self {
        let hub = LoopbackHub::new();
        let host = connections[0];
        let apps = connections
            .iter()
            .map(|connection| {
                let session =
                    PeerSession::new(config.clone(), Box::new(hub.endpoint(*connection)), host)
                        .expect("valid test config");
                Self::build_app(session)
            })
            .collect();
        Self { hub, apps }
    }

    fn build_app(session: PeerSession) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(SkirmishPlugin::new(session));
        app.init_resource::<MessageLog<SessionEventMessage>>()
            .init_resource::<MessageLog<CommandRejected>>();
        app.add_systems(
            Last,
            (
                collect_messages::<SessionEventMessage>,
                collect_messages::<CommandRejected>,
            ),
        );
        // Pause virtual time so that only explicit steps advance the session.
        app.world_mut().resource_mut::<Time<Virtual>>().pause();
        app.update();
        app
    }

    /// Advances every app by `n` fixed ticks.
    pub fn step(&mut self, n: usize) {
        for _ in 0..n {
            for app in &mut self.apps {
                let dt = app.world().resource::<Time<Fixed>>().timestep();
                app.world_mut()
                    .resource_mut::<Time<Fixed>>()
                    .accumulate_overstep(dt);
                app.update();
            }
        }
    }

    pub fn push_command(&self, index: usize, command: SessionCommand) {
        self.apps[index]
            .world()
            .resource::<SessionCommandQueue>()
            .push(command);
    }

    pub fn store(&self, index: usize) -> MatchStore {
        self.apps[index].world().resource::<MatchStore>().clone()
    }

    pub fn messages<M: Message + Clone>(&self, index: usize) -> Vec<M> {
        self.apps[index]
            .world()
            .resource::<MessageLog<M>>()
            .0
            .clone()
    }
}
