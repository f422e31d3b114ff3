//! Skirmish Simulator
//!
//! Runs a host and one client over an in-process loopback with a shared
//! clock. Both peers play a scripted turn: pick an idle unit and send it
//! around the map center into the enemy base.
//!
//! Usage: `skirmish-sim [config.json]`

use std::time::Duration;

use anyhow::{Context, bail};
use skirmish_core::{
    ConnectionId, LoopbackHub, MatchConfig, MatchPhase, NetworkId, PeerSession, SessionEvent,
    TurnPhase,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HOST: ConnectionId = 1;
const CLIENT: ConnectionId = 2;

/// Simulated time after which the match is called off.
const TIME_LIMIT: Duration = Duration::from_secs(600);

/// Distance of the detour waypoint from the map center.
const DETOUR: f32 = 250.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            MatchConfig::from_json(&json).with_context(|| format!("parsing config {path}"))?
        }
        None => MatchConfig::default(),
    };
    let tick = config.tick_duration();

    let hub = LoopbackHub::new();
    let mut peers = [
        PeerSession::new(config.clone(), Box::new(hub.endpoint(HOST)), HOST)?,
        PeerSession::new(config, Box::new(hub.endpoint(CLIENT)), HOST)?,
    ];
    peers[0].on_connection_opened(CLIENT)?;
    peers[0].set_all_ready(true)?;

    let mut now = Duration::ZERO;
    while now < TIME_LIMIT {
        now += tick;
        for peer in &mut peers {
            peer.tick(now)?;
            for event in peer.drain_events() {
                log_event(peer.authority().local_connection, &event);
            }
            if peer.turn_phase() == TurnPhase::SelectingUnit {
                play_turn(peer)?;
            }
        }

        if peers.iter().all(|p| p.outcome().is_some()) {
            break;
        }
    }

    let host = &peers[0];
    if host.current_phase() != MatchPhase::GameOver {
        bail!("no result after {:?} of simulated time", TIME_LIMIT);
    }
    let outcome = host.outcome().context("host reached GameOver without an outcome")?;
    tracing::info!("[sim] Match over at {:?}: {:?}", now, outcome);
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

/// Sends the first idle unit of the local player into the nearest enemy
/// base, detouring around the center so opposing paths do not cross.
fn play_turn(peer: &mut PeerSession) -> anyhow::Result<()> {
    let Some(player) = peer.local_player() else {
        return Ok(());
    };
    let world = peer.world();

    let Some((unit, from)) = world
        .units
        .values()
        .find(|u| *u.owner.get() == player && u.state.get().accepts_path() && u.physics_ready)
        .map(|u| (u.id, *u.body.position.get()))
    else {
        return Ok(());
    };
    let Some(target) = enemy_base(peer, player, from) else {
        return Ok(());
    };
    let own_slot = world.players.get(&player).map_or(0, |p| p.slot);
    let detour = if own_slot % 2 == 0 { DETOUR } else { -DETOUR };

    peer.select_unit(unit)?;
    if let Err(err) = peer.confirm_path(vec![[0.0, detour], target]) {
        // The unit died while the path was drawn; the turn stays ours.
        tracing::warn!("[sim] Path for unit {} refused: {}", unit, err);
        return Ok(());
    }
    tracing::info!(
        "[sim] Connection {} sends unit {} to {:?}",
        peer.authority().local_connection,
        unit,
        target
    );
    Ok(())
}

fn enemy_base(peer: &PeerSession, player: NetworkId, from: [f32; 2]) -> Option<[f32; 2]> {
    peer.world()
        .bases
        .values()
        .filter(|b| b.is_standing() && *b.owner.get() != Some(player))
        .map(|b| b.position)
        .min_by(|a, b| {
            skirmish_core::world::distance(from, *a)
                .total_cmp(&skirmish_core::world::distance(from, *b))
        })
}

fn log_event(connection: ConnectionId, event: &SessionEvent) {
    match event {
        SessionEvent::PhaseEntered(phase) => {
            tracing::info!("[sim] Connection {} entered {:?}", connection, phase);
        }
        SessionEvent::MatchOutcome(outcome) => {
            tracing::info!("[sim] Connection {} sees {:?}", connection, outcome);
        }
        SessionEvent::RosterResetFailed(err) => {
            tracing::warn!("[sim] Connection {}: {}", connection, err);
        }
        other => tracing::debug!("[sim] Connection {}: {:?}", connection, other),
    }
}
