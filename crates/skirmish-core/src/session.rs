//! Per-peer session: wires every component to a transport and drives them
//! from an explicit clock.
//!
//! One call to [`PeerSession::tick`] is one simulation step:
//!
//! 1. Drain inbound frames (never processed mid-tick).
//! 2. Host: countdown, pending despawns, roster reset.
//! 3. Host: gameplay while Playing (production, behaviors, contacts, damage).
//! 4. React to replicated changes on this peer (phase hooks, unit visuals,
//!    owner resolution, turn progress, win check).
//! 5. Host: replicate lifecycle, then fields, then one-shot control messages.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::authority::AuthorityContext;
use crate::config::MatchConfig;
use crate::countdown::CountdownCoordinator;
use crate::error::{AuthorityError, SessionError, UnitError};
use crate::events::SessionEvent;
use crate::phase::{MatchOutcome, MatchPhase, MatchPhaseController, PhaseHooks, Transition};
use crate::protocol::NetMessage;
use crate::registry::{EntityOwnershipRegistry, OwnerResolved};
use crate::roster::{RosterPhase, RosterProgress, RosterResetProtocol, RosterRun};
use crate::transport::Transport;
use crate::turn::{LocalTurnPhaseController, TurnPhase};
use crate::unit::{Strike, UnitState, UnitStateReplicator, VisualCue};
use crate::world::{
    Color, ConnectionId, Lifecycle, NetworkId, PlayerEntity, TeamId, World, distance,
};

/// Maximum spawn offset from the production point, per axis.
const SPAWN_JITTER: f32 = 10.0;

pub struct PeerSession {
    config: MatchConfig,
    authority: AuthorityContext,
    transport: Box<dyn Transport>,
    world: World,
    registry: EntityOwnershipRegistry,
    units: UnitStateReplicator,
    roster: RosterResetProtocol,
    phase: MatchPhaseController,
    turn: LocalTurnPhaseController,
    countdown: CountdownCoordinator,
    events: Vec<SessionEvent>,
    /// One-shot host messages sent after the replication sweep.
    control: Vec<NetMessage>,
    all_ready: bool,
    last_turn: (TurnPhase, Option<NetworkId>),
    rng: ChaCha8Rng,
    last_tick: Option<Duration>,
    now: Duration,
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("authority", &self.authority)
            .field("phase", &self.phase.current_phase())
            .field("players", &self.world.players.len())
            .field("units", &self.world.units.len())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl PeerSession {
    /// Creates the session. The peer is the host when its transport's local
    /// connection equals `host_connection`.
    pub fn new(
        config: MatchConfig,
        transport: Box<dyn Transport>,
        host_connection: ConnectionId,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let local = transport.local_connection();
        let authority = if local == host_connection {
            AuthorityContext::host(local)
        } else {
            AuthorityContext::client(local, host_connection)
        };
        tracing::info!(
            "[session] Connection {} starting as {}",
            local,
            if authority.is_authority { "host" } else { "client" }
        );

        Ok(Self {
            world: World::new(authority, &config),
            registry: EntityOwnershipRegistry::new(),
            units: UnitStateReplicator::new(authority, &config),
            roster: RosterResetProtocol::new(authority, &config),
            phase: MatchPhaseController::new(authority),
            turn: LocalTurnPhaseController::new(),
            countdown: CountdownCoordinator::new(authority),
            events: Vec::new(),
            control: Vec::new(),
            all_ready: false,
            last_turn: (TurnPhase::Inactive, None),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            last_tick: None,
            now: Duration::ZERO,
            authority,
            transport,
            config,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn authority(&self) -> &AuthorityContext {
        &self.authority
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn current_phase(&self) -> MatchPhase {
        self.phase.current_phase()
    }

    pub fn current_player(&self) -> Option<NetworkId> {
        self.turn.current_player()
    }

    pub fn selected_unit(&self) -> Option<NetworkId> {
        self.turn.selected_unit()
    }

    /// Unit whose confirmed path is still waiting for the host.
    pub fn path_in_flight(&self) -> Option<NetworkId> {
        self.turn.path_in_flight()
    }

    pub fn turn_phase(&self) -> TurnPhase {
        self.turn.phase()
    }

    pub fn local_player(&self) -> Option<NetworkId> {
        self.world
            .player_by_connection(self.authority.local_connection)
            .map(|p| p.id)
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.phase.outcome()
    }

    pub fn countdown_remaining(&self) -> Option<Duration> {
        self.countdown.remaining(self.now)
    }

    pub fn roster_in_flight(&self) -> bool {
        self.roster.is_in_flight()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Collaborator inputs
    // ------------------------------------------------------------------

    /// Lobby readiness. A rising edge starts the countdown, a falling edge
    /// cancels it. Only the host acts on it.
    pub fn set_all_ready(&mut self, ready: bool) -> Result<(), SessionError> {
        let previous = std::mem::replace(&mut self.all_ready, ready);
        if !self.authority.is_authority || previous == ready {
            return Ok(());
        }

        if ready {
            if self.phase.current_phase() == MatchPhase::WaitingForPlayers
                && !self.roster.is_in_flight()
            {
                let duration = self.config.countdown;
                self.countdown.start(self.now, duration)?;
            }
        } else {
            self.countdown.cancel(self.now)?;
        }
        Ok(())
    }

    /// Feeds lobby-chosen color and team for a connection.
    pub fn seed_lobby_assignments(
        &mut self,
        connection: ConnectionId,
        color: Color,
        team: TeamId,
    ) -> Result<(), AuthorityError> {
        self.authority.ensure_authority("seed lobby assignments")?;
        self.roster.assignments_mut().seed_lobby(connection, color, team);
        Ok(())
    }

    pub fn on_connection_opened(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        tracing::info!("[session] Connection {} opened", connection);
        if self.authority.is_authority && !self.authority.is_local(connection) {
            self.send_snapshot(connection)?;
        }
        Ok(())
    }

    pub fn on_connection_closed(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        tracing::info!("[session] Connection {} closed", connection);
        if !self.authority.is_authority {
            if connection == self.authority.host_connection {
                tracing::warn!("[session] Host connection {} is gone", connection);
            }
            return Ok(());
        }

        self.countdown.cancel(self.now)?;

        let Some(player) = self.world.player_by_connection(connection).map(|p| p.id) else {
            return Ok(());
        };
        let owned: Vec<NetworkId> = self
            .world
            .units
            .values()
            .filter(|u| *u.owner.get() == player)
            .map(|u| u.id)
            .collect();
        for unit in owned {
            self.world.remove_unit(unit);
            self.registry.forget_unit(unit);
        }
        for base in self.world.bases.values_mut() {
            if *base.owner.get() == Some(player) {
                base.owner.set(None)?;
                base.production_enabled = false;
                base.next_production = None;
            }
        }
        self.world.remove_player(player);
        self.turn.sync_roster(self.world.player_order());
        tracing::info!("[session] Removed player {} of connection {}", player, connection);
        Ok(())
    }

    /// Host-only phase transition.
    ///
    /// A request for GameStart from the lobby starts the roster reset; the
    /// phase itself changes once the roster is verified clean.
    pub fn request_transition(&mut self, next: MatchPhase) -> Result<Transition, SessionError> {
        let current = self.phase.current_phase();
        if next == MatchPhase::GameStart && current == MatchPhase::WaitingForPlayers {
            self.authority.ensure_authority("request phase transition")?;
            return Ok(match self.start_match()? {
                RosterRun::Started(_) => Transition::Deferred,
                RosterRun::AlreadyInFlight => Transition::Unchanged,
            });
        }
        let transition = self
            .phase
            .request_transition(next, self.roster.is_in_flight())?;
        Ok(transition)
    }

    /// Starts (or retries) the roster reset that leads into a match.
    pub fn start_match(&mut self) -> Result<RosterRun, SessionError> {
        let run = self.roster.run(&mut self.world, self.now)?;
        if matches!(run, RosterRun::Started(_)) {
            self.registry.clear();
        }
        Ok(run)
    }

    /// Host-only: from GameOver back to the lobby.
    pub fn request_rematch(&mut self) -> Result<Transition, SessionError> {
        self.authority.ensure_authority("request rematch")?;
        if self.phase.current_phase() != MatchPhase::GameOver {
            tracing::warn!(
                "[session] Rematch requested during {:?}",
                self.phase.current_phase()
            );
            return Ok(Transition::Rejected);
        }
        self.request_transition(MatchPhase::WaitingForPlayers)
    }

    pub fn select_unit(&mut self, unit: NetworkId) -> Result<(), SessionError> {
        self.turn.select_unit(&self.world, unit)?;
        self.emit_turn_change();
        Ok(())
    }

    /// Confirms the drawn path.
    ///
    /// The host applies it directly and the turn moves on only if the unit
    /// accepted it. Other peers send it host-ward and keep the turn until the
    /// unit is seen following the path or the host refuses it.
    pub fn confirm_path(&mut self, points: Vec<[f32; 2]>) -> Result<(), SessionError> {
        let intent = self.turn.confirm_path(points)?;

        if self.authority.is_authority {
            let local = self.authority.local_connection;
            if let Err(err) = self.apply_path_command(local, intent.unit, intent.points) {
                tracing::warn!("[session] Path for unit {} refused: {}", intent.unit, err);
                self.refuse_local_path(intent.unit);
                return Err(err.into());
            }
            if let Some(player) = self.turn.local_player() {
                self.turn.observe_path_started(player);
            }
        } else {
            self.transport.send_to(
                self.authority.host_connection,
                &NetMessage::PathCommand {
                    unit: intent.unit,
                    points: intent.points,
                },
            )?;
        }
        self.emit_turn_change();
        Ok(())
    }

    fn refuse_local_path(&mut self, unit: NetworkId) {
        if self.turn.path_rejected(unit) {
            self.events.push(SessionEvent::PathRejected { unit });
        }
        self.emit_turn_change();
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    pub fn tick(&mut self, now: Duration) -> Result<(), SessionError> {
        let dt = self
            .last_tick
            .map_or_else(|| self.config.tick_duration(), |last| now.saturating_sub(last));
        self.last_tick = Some(now);
        self.now = now;

        for (from, message) in self.transport.drain_inbound() {
            let kind = message.kind();
            if let Err(err) = self.handle_message(from, message) {
                tracing::warn!("[session] Rejected {} from {}: {}", kind, from, err);
            }
        }
        self.dispatch_changes()?;

        if self.authority.is_authority {
            if self.countdown.tick(now) {
                self.request_transition(MatchPhase::GameStart)?;
            }
            self.world.flush_despawns(now);
            self.tick_roster()?;
            self.dispatch_changes()?;

            if self.phase.current_phase() == MatchPhase::Playing {
                self.simulate(now, dt);
                self.dispatch_changes()?;
            }
            self.replicate()?;
        }
        Ok(())
    }

    fn tick_roster(&mut self) -> Result<(), SessionError> {
        let connected = self.transport.connected_connection_ids().len();
        match self.roster.tick(&self.world, self.now, connected) {
            RosterProgress::Idle | RosterProgress::Pending => {}
            RosterProgress::Notify(attempt) => {
                self.phase.complete_reset(MatchPhase::GameStart)?;
                self.control.push(NetMessage::ResetAndRequestSpawn { attempt });
                self.reset_bookkeeping();
                let local = self.authority.local_connection;
                self.handle_spawn_request(local, attempt)?;
            }
            RosterProgress::Completed => self.finish_reset()?,
            RosterProgress::Failed(err) => {
                if self.phase.current_phase() == MatchPhase::GameStart {
                    self.phase.complete_reset(MatchPhase::WaitingForPlayers)?;
                }
                self.events.push(SessionEvent::RosterResetFailed(err));
                self.apply_deferred()?;
            }
        }
        Ok(())
    }

    fn handle_spawn_request(&mut self, from: ConnectionId, attempt: Uuid) -> Result<(), SessionError> {
        let connected = self.transport.connected_connection_ids();
        let outcome = self
            .roster
            .handle_spawn_request(&mut self.world, from, attempt, &connected)?;
        if outcome.complete {
            self.finish_reset()?;
        }
        Ok(())
    }

    fn finish_reset(&mut self) -> Result<(), SessionError> {
        self.phase.complete_reset(MatchPhase::Playing)?;
        self.apply_deferred()
    }

    fn apply_deferred(&mut self) -> Result<(), SessionError> {
        if let Some(next) = self.phase.take_deferred() {
            tracing::info!("[session] Applying deferred transition to {:?}", next);
            self.request_transition(next)?;
        }
        Ok(())
    }

    /// Peer-local state that must not survive a roster reset.
    fn reset_bookkeeping(&mut self) {
        self.turn.reset();
        self.registry.clear();
        for player in self.world.players.values_mut() {
            player.units.clear();
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn handle_message(&mut self, from: ConnectionId, message: NetMessage) -> Result<(), SessionError> {
        if message.is_host_origin() {
            if from != self.authority.host_connection || self.authority.is_authority {
                tracing::warn!(
                    "[net] Dropping {} from {}: only the host sends it",
                    message.kind(),
                    from
                );
                return Ok(());
            }
        } else if !self.authority.is_authority {
            tracing::warn!("[net] Dropping {} from {}: not the host", message.kind(), from);
            return Ok(());
        }

        match message {
            NetMessage::PhaseReplicated { version, phase } => {
                self.phase.replica_mut().apply_remote(version, phase);
            }
            NetMessage::DeadlineReplicated { version, deadline } => {
                self.countdown.replica_mut().apply_remote(version, deadline);
            }
            NetMessage::PlayerSpawned {
                id,
                connection,
                slot,
                color,
                team,
            } => {
                self.world.insert_player(PlayerEntity::new(
                    id,
                    connection,
                    slot,
                    color,
                    team,
                    &self.authority,
                ));
                let resolved = self.registry.on_player_spawned(&mut self.world, id);
                self.emit_resolved(resolved);
                self.turn.sync_roster(self.world.player_order());
            }
            NetMessage::PlayerDespawned { id } => {
                self.world.remove_player(id);
                self.turn.sync_roster(self.world.player_order());
            }
            NetMessage::PlayerAttributes { id, color, team } => {
                if let Some(player) = self.world.players.get_mut(&id) {
                    if let Some((version, color)) = color {
                        player.color.apply_remote(version, color);
                    }
                    if let Some((version, team)) = team {
                        player.team.apply_remote(version, team);
                    }
                }
            }
            NetMessage::BaseOwner { id, version, owner } => {
                if let Some(base) = self.world.bases.get_mut(&id) {
                    base.owner.apply_remote(version, owner);
                }
            }
            NetMessage::BaseHealth { id, version, health } => {
                if let Some(base) = self.world.bases.get_mut(&id) {
                    base.health.apply_remote(version, health);
                }
            }
            NetMessage::UnitSpawned { id, owner, position } => {
                let unit = self.units.create_unit(id, owner, position);
                self.world.insert_unit(unit);
                let resolved = self
                    .registry
                    .on_owner_id_changed(&mut self.world, id, None, owner);
                self.emit_resolved(resolved);
            }
            NetMessage::UnitOwner { id, version, owner } => {
                if let Some(unit) = self.world.units.get_mut(&id) {
                    unit.owner.apply_remote(version, owner);
                }
            }
            NetMessage::UnitState { id, version, state } => {
                if let Some(unit) = self.world.units.get_mut(&id) {
                    unit.state.apply_remote(version, state);
                }
            }
            NetMessage::UnitTransform { id, version, position } => {
                if let Some(unit) = self.world.units.get_mut(&id) {
                    unit.body.position.apply_remote(version, position);
                }
            }
            NetMessage::UnitDespawned { id } => {
                self.world.remove_unit(id);
                self.registry.forget_unit(id);
            }
            NetMessage::ResetAndRequestSpawn { attempt } => {
                tracing::info!("[session] Reset {} announced, requesting spawn", attempt);
                self.reset_bookkeeping();
                self.transport.send_to(
                    self.authority.host_connection,
                    &NetMessage::SpawnRequest { attempt },
                )?;
            }
            NetMessage::MatchOutcome(outcome) => {
                self.phase.record_outcome(outcome, &mut self.events);
            }
            NetMessage::SpawnRequest { attempt } => {
                self.handle_spawn_request(from, attempt)?;
            }
            NetMessage::PathCommand { unit, points } => {
                if let Err(err) = self.apply_path_command(from, unit, points) {
                    self.transport
                        .send_to(from, &NetMessage::PathRejected { unit })?;
                    return Err(err.into());
                }
            }
            NetMessage::PathRejected { unit } => {
                tracing::warn!("[session] Host refused the path for unit {}", unit);
                self.refuse_local_path(unit);
            }
        }
        Ok(())
    }

    /// Host-side path command for `unit` issued by `from`.
    fn apply_path_command(
        &mut self,
        from: ConnectionId,
        unit: NetworkId,
        points: Vec<[f32; 2]>,
    ) -> Result<(), UnitError> {
        self.authority.ensure_authority("apply path command")?;

        let entity = self.world.units.get(&unit).ok_or(UnitError::NotFound(unit))?;
        let owner_connection = self
            .world
            .players
            .get(entity.owner.get())
            .map(|p| p.connection);
        if owner_connection != Some(from) {
            return Err(UnitError::NotOwner {
                unit,
                connection: from,
            });
        }
        if entity.is_dead() {
            return Err(UnitError::Terminal(unit));
        }
        if !entity.state.get().accepts_path() {
            return Err(UnitError::Busy(unit));
        }
        if points.is_empty() {
            return Err(UnitError::EmptyPath(unit));
        }

        let Some(entity) = self.world.units.get_mut(&unit) else {
            return Err(UnitError::NotFound(unit));
        };
        tracing::debug!("[session] Unit {} following {} waypoint(s)", unit, points.len());
        entity.body.waypoints = points;
        entity.body.pending = false;
        self.units
            .change_state(entity, UnitState::FollowingPath, self.now)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Host gameplay
    // ------------------------------------------------------------------

    fn simulate(&mut self, now: Duration, dt: Duration) {
        self.produce_units(now);

        let mut strikes: Vec<Strike> = Vec::new();
        let mut despawns: Vec<NetworkId> = Vec::new();
        let ids: Vec<NetworkId> = self.world.units.keys().copied().collect();
        for id in ids {
            let Some(unit) = self.world.units.get_mut(&id) else {
                continue;
            };
            match self.units.tick_unit(unit, now, dt) {
                Ok(report) => {
                    strikes.extend(report.strike);
                    if report.despawn {
                        despawns.push(id);
                    }
                }
                Err(err) => tracing::warn!("[unit] Tick of unit {} failed: {}", id, err),
            }
        }

        self.resolve_contacts(now);
        self.apply_strikes(&strikes);

        for id in despawns {
            tracing::debug!("[session] Removing dead unit {}", id);
            self.world.remove_unit(id);
            self.registry.forget_unit(id);
        }
    }

    fn produce_units(&mut self, now: Duration) {
        let interval = self.config.production_interval;
        let mut due: Vec<(NetworkId, [f32; 2])> = Vec::new();
        for base in self.world.bases.values_mut() {
            let Some(owner) = *base.owner.get() else {
                continue;
            };
            if !base.production_enabled || !base.is_alive() {
                continue;
            }
            match base.next_production {
                Some(at) if now >= at => {
                    base.next_production = Some(now + interval);
                    due.push((owner, base.position));
                }
                Some(_) => {}
                None => base.next_production = Some(now + interval),
            }
        }

        for (owner, base_position) in due {
            if !self.world.players.contains_key(&owner)
                || self.world.living_units_of(owner) >= self.config.max_units_per_player
            {
                continue;
            }
            let position = self.spawn_point(base_position);
            let id = self.world.allocate_id();
            let unit = self.units.create_unit(id, owner, position);
            self.world.insert_unit(unit);
            tracing::debug!("[session] Base of player {} produced unit {}", owner, id);
            let resolved = self
                .registry
                .on_owner_id_changed(&mut self.world, id, None, owner);
            self.emit_resolved(resolved);
        }
    }

    /// Just outside the base, on the side facing the map center.
    fn spawn_point(&mut self, base: [f32; 2]) -> [f32; 2] {
        let length = distance([0.0, 0.0], base);
        let (dx, dy) = if length > f32::EPSILON {
            (-base[0] / length, -base[1] / length)
        } else {
            (1.0, 0.0)
        };
        let reach = self.config.base_radius + SPAWN_JITTER;
        [
            base[0] + dx * reach + self.rng.random_range(-SPAWN_JITTER..SPAWN_JITTER),
            base[1] + dy * reach + self.rng.random_range(-SPAWN_JITTER..SPAWN_JITTER),
        ]
    }

    /// Unit/unit contact kills both; unit/enemy-base contact starts an
    /// attack. Units that are not physics-ready take no part.
    fn resolve_contacts(&mut self, now: Duration) {
        struct Body {
            id: NetworkId,
            owner: NetworkId,
            position: [f32; 2],
            state: UnitState,
            ignore: Option<NetworkId>,
        }

        let bodies: Vec<Body> = self
            .world
            .units
            .values()
            .filter(|u| u.physics_ready && !u.is_dead())
            .map(|u| Body {
                id: u.id,
                owner: *u.owner.get(),
                position: *u.body.position.get(),
                state: *u.state.get(),
                ignore: u.ignore_collision_with,
            })
            .collect();

        let mut killed: BTreeSet<NetworkId> = BTreeSet::new();
        for (i, a) in bodies.iter().enumerate() {
            for b in &bodies[i + 1..] {
                if a.owner != b.owner
                    && distance(a.position, b.position) <= self.config.contact_radius
                {
                    killed.insert(a.id);
                    killed.insert(b.id);
                }
            }
        }

        let mut attacks: Vec<(NetworkId, NetworkId)> = Vec::new();
        for body in &bodies {
            if killed.contains(&body.id) || body.state == UnitState::Attacking {
                continue;
            }
            let target = self.world.bases.values().find(|base| {
                base.is_alive()
                    && base.owner.get().is_some_and(|owner| owner != body.owner)
                    && body.ignore != Some(base.id)
                    && distance(body.position, base.position) <= self.config.base_radius
            });
            if let Some(base) = target {
                attacks.push((body.id, base.id));
            }
        }

        for id in killed {
            if let Some(unit) = self.world.units.get_mut(&id) {
                tracing::debug!("[session] Unit {} destroyed on contact", id);
                if let Err(err) = self.units.change_state(unit, UnitState::Dead, now) {
                    tracing::warn!("[session] {}", err);
                }
            }
        }
        for (id, base) in attacks {
            if let Some(unit) = self.world.units.get_mut(&id) {
                tracing::debug!("[session] Unit {} attacking base {}", id, base);
                unit.body.target_base = Some(base);
                if let Err(err) = self.units.change_state(unit, UnitState::Attacking, now) {
                    tracing::warn!("[session] {}", err);
                }
            }
        }
    }

    fn apply_strikes(&mut self, strikes: &[Strike]) {
        for strike in strikes {
            let Some(base) = self.world.bases.get_mut(&strike.base) else {
                continue;
            };
            if !base.is_alive() {
                continue;
            }
            let health = base.health.get().saturating_sub(strike.damage);
            if let Err(err) = base.health.set(health) {
                tracing::warn!("[session] {}", err);
                continue;
            }
            if health == 0 {
                base.production_enabled = false;
                base.next_production = None;
                tracing::info!(
                    "[session] Base {} destroyed by unit {}",
                    strike.base,
                    strike.unit
                );
            }
        }
    }

    /// Ends the match once at most one owner still has a standing base.
    fn check_win(&mut self) -> Result<(), SessionError> {
        if !self.authority.is_authority || self.phase.current_phase() != MatchPhase::Playing {
            return Ok(());
        }
        let standing: BTreeSet<NetworkId> = self
            .world
            .bases
            .values()
            .filter(|b| b.is_standing())
            .filter_map(|b| *b.owner.get())
            .collect();
        if standing.len() <= 1 {
            tracing::info!("[session] {} standing owner(s) left, ending match", standing.len());
            self.phase.request_transition(MatchPhase::GameOver, false)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local reactions to replicated changes
    // ------------------------------------------------------------------

    fn dispatch_changes(&mut self) -> Result<(), SessionError> {
        loop {
            self.dispatch_phase();
            self.dispatch_countdown();
            self.dispatch_units();
            let bases_changed = self.dispatch_bases();
            for player in self.world.players.values_mut() {
                player.color.drain_changes();
                player.team.drain_changes();
            }
            if bases_changed {
                self.check_win()?;
            }
            if !self.phase.replica_mut().has_changes() {
                break;
            }
        }
        self.emit_turn_change();
        Ok(())
    }

    fn dispatch_phase(&mut self) {
        let before = self.events.len();
        let mut hooks = PhaseHooks {
            world: &mut self.world,
            turn: &mut self.turn,
            events: &mut self.events,
            now: self.now,
            production_interval: self.config.production_interval,
        };
        if let Some(outcome) = self.phase.dispatch(&mut hooks) {
            self.control.push(NetMessage::MatchOutcome(outcome));
        }
        if self.events[before..].contains(&SessionEvent::ClearLobbyReady) {
            self.all_ready = false;
        }
    }

    fn dispatch_countdown(&mut self) {
        for change in self.countdown.replica_mut().drain_changes() {
            match (change.previous, change.next) {
                (_, Some(deadline)) => self.events.push(SessionEvent::CountdownStarted { deadline }),
                (Some(previous), None) if self.now < previous => {
                    self.events.push(SessionEvent::CountdownCancelled);
                }
                _ => {}
            }
        }
    }

    fn dispatch_units(&mut self) {
        let ids: Vec<NetworkId> = self.world.units.keys().copied().collect();
        for id in ids {
            let Some(unit) = self.world.units.get_mut(&id) else {
                continue;
            };
            unit.body.position.drain_changes();
            let owner_changes = unit.owner.drain_changes();
            let owner = *unit.owner.get();

            let mut started_path = false;
            for change in unit.state.drain_changes() {
                let cue = self
                    .units
                    .on_state_replicated(unit, &change)
                    .unwrap_or(VisualCue::for_state(change.next));
                self.events.push(SessionEvent::UnitVisual { unit: id, cue });
                if change.next == UnitState::FollowingPath && change.previous.accepts_path() {
                    started_path = true;
                }
            }

            for change in owner_changes {
                let resolved = self.registry.on_owner_id_changed(
                    &mut self.world,
                    id,
                    Some(change.previous),
                    change.next,
                );
                self.emit_resolved(resolved);
            }

            if started_path {
                self.turn.observe_path_started(owner);
            }
        }
    }

    /// Drains base changes. Returns whether anything changed.
    fn dispatch_bases(&mut self) -> bool {
        let mut changed = false;
        for base in self.world.bases.values_mut() {
            changed |= !base.owner.drain_changes().is_empty();
            changed |= !base.health.drain_changes().is_empty();
        }
        changed
    }

    fn emit_resolved(&mut self, resolved: impl IntoIterator<Item = OwnerResolved>) {
        for r in resolved {
            self.events.push(SessionEvent::UnitTinted {
                unit: r.unit,
                player: r.player,
                color: r.tint,
            });
        }
    }

    fn emit_turn_change(&mut self) {
        let current = (self.turn.phase(), self.turn.current_player());
        if current != self.last_turn {
            self.last_turn = current;
            tracing::debug!("[turn] {:?}, current player {:?}", current.0, current.1);
            self.events.push(SessionEvent::TurnPhaseChanged {
                phase: current.0,
                current_player: current.1,
            });
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Host replication sweep.
    fn replicate(&mut self) -> Result<(), SessionError> {
        let mut out: Vec<NetMessage> = Vec::new();

        for entry in self.world.take_lifecycle() {
            match entry {
                Lifecycle::PlayerSpawned(id) => {
                    if let Some(player) = self.world.players.get(&id) {
                        out.push(player_spawned(player));
                    }
                }
                Lifecycle::PlayerDespawned(id) => out.push(NetMessage::PlayerDespawned { id }),
                Lifecycle::UnitSpawned(id) => {
                    if let Some(unit) = self.world.units.get(&id) {
                        out.push(NetMessage::UnitSpawned {
                            id,
                            owner: *unit.owner.get(),
                            position: *unit.body.position.get(),
                        });
                    }
                }
                Lifecycle::UnitDespawned(id) => out.push(NetMessage::UnitDespawned { id }),
            }
        }

        for player in self.world.players.values_mut() {
            let color = player.color.take_outbox().pop();
            let team = player.team.take_outbox().pop();
            if color.is_some() || team.is_some() {
                out.push(NetMessage::PlayerAttributes {
                    id: player.id,
                    color,
                    team,
                });
            }
        }

        for base in self.world.bases.values_mut() {
            for (version, owner) in base.owner.take_outbox() {
                out.push(NetMessage::BaseOwner {
                    id: base.id,
                    version,
                    owner,
                });
            }
            for (version, health) in base.health.take_outbox() {
                out.push(NetMessage::BaseHealth {
                    id: base.id,
                    version,
                    health,
                });
            }
        }

        for unit in self.world.units.values_mut() {
            for (version, owner) in unit.owner.take_outbox() {
                out.push(NetMessage::UnitOwner {
                    id: unit.id,
                    version,
                    owner,
                });
            }
            for (version, state) in unit.state.take_outbox() {
                out.push(NetMessage::UnitState {
                    id: unit.id,
                    version,
                    state,
                });
            }
            if let Some((version, position)) = unit.body.position.take_outbox().pop() {
                out.push(NetMessage::UnitTransform {
                    id: unit.id,
                    version,
                    position,
                });
            }
        }

        for (version, deadline) in self.countdown.replica_mut().take_outbox() {
            out.push(NetMessage::DeadlineReplicated { version, deadline });
        }
        for (version, phase) in self.phase.replica_mut().take_outbox() {
            out.push(NetMessage::PhaseReplicated { version, phase });
        }
        out.append(&mut self.control);

        for message in &out {
            self.transport.send_to_all(message)?;
        }
        Ok(())
    }

    /// Current state for a connection that joined late.
    fn send_snapshot(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        let mut out: Vec<NetMessage> = Vec::new();
        out.extend(self.world.players.values().map(player_spawned));
        for base in self.world.bases.values() {
            out.push(NetMessage::BaseOwner {
                id: base.id,
                version: base.owner.version(),
                owner: *base.owner.get(),
            });
            out.push(NetMessage::BaseHealth {
                id: base.id,
                version: base.health.version(),
                health: *base.health.get(),
            });
        }
        for unit in self.world.units.values() {
            out.push(NetMessage::UnitSpawned {
                id: unit.id,
                owner: *unit.owner.get(),
                position: *unit.body.position.get(),
            });
            out.push(NetMessage::UnitState {
                id: unit.id,
                version: unit.state.version(),
                state: *unit.state.get(),
            });
        }
        out.push(NetMessage::DeadlineReplicated {
            version: self.countdown.replica_mut().version(),
            deadline: self.countdown.deadline(),
        });
        out.push(NetMessage::PhaseReplicated {
            version: self.phase.replica_mut().version(),
            phase: self.phase.current_phase(),
        });
        if let Some(outcome) = self.phase.outcome() {
            out.push(NetMessage::MatchOutcome(outcome));
        }
        if self.roster.phase() == Some(RosterPhase::AwaitingRespawnRequests) {
            if let Some(attempt) = self.roster.attempt_id() {
                out.push(NetMessage::ResetAndRequestSpawn { attempt });
            }
        }

        tracing::info!(
            "[session] Sending snapshot ({} messages) to connection {}",
            out.len(),
            connection
        );
        for message in &out {
            self.transport.send_to(connection, message)?;
        }
        Ok(())
    }
}

fn player_spawned(player: &PlayerEntity) -> NetMessage {
    NetMessage::PlayerSpawned {
        id: player.id,
        connection: player.connection,
        slot: player.slot,
        color: *player.color.get(),
        team: *player.team.get(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RosterError, TurnError};
    use crate::transport::LoopbackHub;

    const HOST: ConnectionId = 1;
    const STEP: Duration = Duration::from_millis(100);

    fn test_config() -> MatchConfig {
        MatchConfig {
            tick_rate: 10,
            production_interval: Duration::from_secs(1),
            max_units_per_player: 1,
            ..MatchConfig::default()
        }
    }

    /// A host and its clients on one loopback, stepped on a shared clock.
    struct Harness {
        hub: LoopbackHub,
        peers: Vec<PeerSession>,
        now: Duration,
    }

    impl Harness {
        fn new(connections: &[ConnectionId], config: &MatchConfig) -> Self {
            let hub = LoopbackHub::new();
            let peers = connections
                .iter()
                .map(|c| PeerSession::new(config.clone(), Box::new(hub.endpoint(*c)), HOST).unwrap())
                .collect();
            Self {
                hub,
                peers,
                now: Duration::ZERO,
            }
        }

        fn host(&mut self) -> &mut PeerSession {
            &mut self.peers[0]
        }

        fn client(&mut self) -> &mut PeerSession {
            &mut self.peers[1]
        }

        fn step(&mut self) {
            self.now += STEP;
            for peer in &mut self.peers {
                peer.tick(self.now).unwrap();
            }
        }

        fn step_until(&mut self, limit: Duration) {
            while self.now + STEP <= limit {
                self.step();
            }
        }

        fn run_until(&mut self, max: Duration, done: impl Fn(&Harness) -> bool) -> bool {
            while self.now < max {
                self.step();
                if done(self) {
                    return true;
                }
            }
            false
        }

        fn all_in(&self, phase: MatchPhase) -> bool {
            self.peers.iter().all(|p| p.current_phase() == phase)
        }

        /// Lobby readiness to Playing on every peer.
        fn reach_playing(&mut self) {
            self.host().set_all_ready(true).unwrap();
            assert!(self.run_until(Duration::from_secs(10), |h| h.all_in(MatchPhase::Playing)));
        }

        fn events(&mut self, index: usize) -> Vec<SessionEvent> {
            self.peers[index].drain_events()
        }
    }

    fn entered(events: &[SessionEvent]) -> Vec<MatchPhase> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::PhaseEntered(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn unit_of(session: &PeerSession, owner: NetworkId) -> Option<NetworkId> {
        session
            .world()
            .units
            .values()
            .find(|u| *u.owner.get() == owner && !u.is_dead())
            .map(|u| u.id)
    }

    #[test]
    fn test_match_reaches_playing_on_both_peers() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.reach_playing();

        let host_player = h.host().local_player().unwrap();
        let client_player = h.client().local_player().unwrap();
        assert!(host_player < client_player);

        for peer in &h.peers {
            assert_eq!(peer.world().players.len(), 2);
            assert_eq!(peer.current_player(), Some(host_player));
        }
        assert_eq!(h.host().turn_phase(), TurnPhase::SelectingUnit);
        assert_eq!(h.client().turn_phase(), TurnPhase::AwaitingOthers);

        let client_events = h.events(1);
        assert_eq!(
            entered(&client_events),
            vec![MatchPhase::GameStart, MatchPhase::Playing]
        );
        assert!(client_events.contains(&SessionEvent::ClearLobbyReady));
        assert_eq!(entered(&h.events(0)), entered(&client_events));
    }

    #[test]
    fn test_players_keep_assignments_across_rematch() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.host().seed_lobby_assignments(2, Color::WHITE, 9).unwrap();
        h.reach_playing();

        let colors = |s: &PeerSession| -> Vec<(ConnectionId, Color, TeamId)> {
            s.world()
                .players
                .values()
                .map(|p| (p.connection, *p.color.get(), *p.team.get()))
                .collect()
        };
        let first = colors(&h.peers[0]);
        assert!(first.contains(&(2, Color::WHITE, 9)));

        // Destroy the client's base to end the match.
        let client_player = h.client().local_player().unwrap();
        let base = h.host().world().base_owned_by(client_player).unwrap().id;
        h.host().world.bases.get_mut(&base).unwrap().health.set(0).unwrap();
        assert!(h.run_until(h.now + Duration::from_secs(1), |h| h.all_in(MatchPhase::GameOver)));

        assert_eq!(h.host().request_rematch().unwrap(), Transition::Applied);
        h.step();
        h.reach_playing();

        assert_eq!(h.host().world().players.len(), 2);
        let mut second = colors(&h.peers[0]);
        let mut first = first;
        first.sort_by_key(|c| c.0);
        second.sort_by_key(|c| c.0);
        assert_eq!(first, second);
        assert_eq!(colors(&h.peers[1]).len(), 2);
    }

    #[test]
    fn test_scenario_slow_cleanup_aborts_then_retry_succeeds() {
        let config = MatchConfig {
            roster_timeout: Duration::from_secs(5),
            despawn_latency: Duration::from_secs(6),
            ..test_config()
        };
        let mut h = Harness::new(&[HOST, 2], &config);
        {
            let host = h.host();
            let authority = *host.authority();
            for (connection, slot) in [(HOST, 0), (2, 1)] {
                let id = host.world.allocate_id();
                host.world
                    .insert_player(PlayerEntity::new(id, connection, slot, Color::RED, 0, &authority));
            }
        }

        assert!(matches!(h.host().start_match().unwrap(), RosterRun::Started(_)));
        assert!(h.run_until(Duration::from_secs(6), |h| !h.peers[0].roster_in_flight()));
        assert!(h.now >= Duration::from_secs(5));

        let host_events = h.events(0);
        assert!(host_events.iter().any(|e| matches!(
            e,
            SessionEvent::RosterResetFailed(RosterError::CleanupTimedOut { remaining: 2, .. })
        )));
        assert!(h.all_in(MatchPhase::WaitingForPlayers));
        assert!(!entered(&h.events(1)).contains(&MatchPhase::GameStart));

        // Cleanup finishes at 6 s; retry 2 s later.
        h.step_until(Duration::from_secs(8));
        assert_eq!(h.host().world().roster_count(), 0);
        assert!(matches!(h.host().start_match().unwrap(), RosterRun::Started(_)));
        assert!(h.run_until(Duration::from_secs(12), |h| h.all_in(MatchPhase::Playing)));
        assert_eq!(h.client().world().players.len(), 2);
    }

    #[test]
    fn test_scenario_countdown_cancelled_by_readiness_drop() {
        let config = MatchConfig {
            countdown: Duration::from_secs(3),
            ..test_config()
        };
        let mut h = Harness::new(&[HOST, 2], &config);
        h.host().set_all_ready(true).unwrap();
        h.step();
        assert_eq!(h.client().countdown_remaining(), Some(Duration::from_millis(2900)));

        h.step_until(Duration::from_millis(1500));
        h.host().set_all_ready(false).unwrap();
        h.step_until(Duration::from_secs(4));

        assert!(h.all_in(MatchPhase::WaitingForPlayers));
        assert!(!h.host().roster_in_flight());
        let client_events = h.events(1);
        assert!(client_events
            .iter()
            .any(|e| matches!(e, SessionEvent::CountdownStarted { .. })));
        assert!(client_events.contains(&SessionEvent::CountdownCancelled));
        assert!(entered(&client_events).is_empty());
    }

    #[test]
    fn test_scenario_three_bases_game_over_when_one_remains() {
        let mut h = Harness::new(&[HOST, 2, 3], &test_config());
        h.reach_playing();
        assert_eq!(h.host().world().bases.values().filter(|b| b.is_standing()).count(), 3);

        let third = h.peers[2].local_player().unwrap();
        let second = h.peers[1].local_player().unwrap();
        let base_of = |s: &PeerSession, p| s.world().base_owned_by(p).map(|b| b.id).unwrap();

        let doomed = base_of(&h.peers[0], third);
        h.host().world.bases.get_mut(&doomed).unwrap().health.set(0).unwrap();
        h.step_until(h.now + Duration::from_secs(1));
        assert!(h.all_in(MatchPhase::Playing));

        let doomed = base_of(&h.peers[0], second);
        h.host().world.bases.get_mut(&doomed).unwrap().health.set(0).unwrap();
        assert!(h.run_until(h.now + Duration::from_secs(1), |h| {
            h.all_in(MatchPhase::GameOver) && h.peers.iter().all(|p| p.outcome().is_some())
        }));

        let winner = h.host().local_player().unwrap();
        let expected = MatchOutcome::Winner {
            player: winner,
            connection: HOST,
        };
        for peer in &h.peers {
            assert_eq!(peer.outcome(), Some(expected));
        }
    }

    #[test]
    fn test_turns_alternate_through_path_commands() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.reach_playing();
        let host_player = h.host().local_player().unwrap();
        let client_player = h.client().local_player().unwrap();
        assert!(h.run_until(h.now + Duration::from_secs(3), |h| {
            unit_of(&h.peers[0], host_player).is_some()
                && unit_of(&h.peers[1], client_player).is_some()
        }));

        // The client cannot act out of turn.
        let client_unit = unit_of(&h.peers[1], client_player).unwrap();
        assert!(matches!(
            h.client().select_unit(client_unit),
            Err(SessionError::Turn(TurnError::NotYourTurn { .. }))
        ));

        let host_unit = unit_of(&h.peers[0], host_player).unwrap();
        h.host().select_unit(host_unit).unwrap();
        assert_eq!(h.host().selected_unit(), Some(host_unit));
        h.host().confirm_path(vec![[-300.0, 100.0]]).unwrap();
        assert_eq!(h.host().turn_phase(), TurnPhase::AwaitingOthers);
        assert_eq!(
            *h.host().world().units[&host_unit].state.get(),
            UnitState::FollowingPath
        );

        h.step();
        assert_eq!(h.client().turn_phase(), TurnPhase::SelectingUnit);
        assert!(!h.client().world().units[&host_unit].body.pending);

        h.client().select_unit(client_unit).unwrap();
        h.client().confirm_path(vec![[300.0, 100.0]]).unwrap();
        assert_eq!(h.client().turn_phase(), TurnPhase::DrawingPath);
        assert_eq!(h.client().current_player(), Some(client_player));

        h.step();
        assert_eq!(h.client().turn_phase(), TurnPhase::AwaitingOthers);
        assert_eq!(h.host().turn_phase(), TurnPhase::SelectingUnit);
        assert_eq!(
            *h.host().world().units[&client_unit].state.get(),
            UnitState::FollowingPath
        );
        h.step();
        assert_eq!(
            *h.client().world().units[&client_unit].state.get(),
            UnitState::FollowingPath
        );
        assert!(!h.client().world().units[&client_unit].behavior.is_authoritative());
    }

    #[test]
    fn test_path_for_unit_killed_while_drawing_keeps_the_turn() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.reach_playing();
        let host_player = h.host().local_player().unwrap();
        assert!(h.run_until(h.now + Duration::from_secs(3), |h| {
            unit_of(&h.peers[0], host_player).is_some()
        }));
        let doomed = unit_of(&h.peers[0], host_player).unwrap();
        h.host().select_unit(doomed).unwrap();

        let now = h.now;
        let host = h.host();
        let entity = host.world.units.get_mut(&doomed).unwrap();
        host.units.change_state(entity, UnitState::Dead, now).unwrap();

        assert!(matches!(
            h.host().confirm_path(vec![[0.0, 0.0]]),
            Err(SessionError::Unit(UnitError::Terminal(u))) if u == doomed
        ));
        assert_eq!(h.host().turn_phase(), TurnPhase::SelectingUnit);
        assert_eq!(h.host().current_player(), Some(host_player));
        assert_eq!(h.host().selected_unit(), None);
        assert!(h.events(0).contains(&SessionEvent::PathRejected { unit: doomed }));

        h.step();
        assert_eq!(h.client().turn_phase(), TurnPhase::AwaitingOthers);
        assert_eq!(h.client().current_player(), Some(host_player));

        // A fresh unit takes the turn forward.
        assert!(h.run_until(h.now + Duration::from_secs(3), |h| {
            unit_of(&h.peers[0], host_player).is_some_and(|u| u != doomed)
        }));
        let fresh = unit_of(&h.peers[0], host_player).unwrap();
        h.host().select_unit(fresh).unwrap();
        h.host().confirm_path(vec![[-300.0, 100.0]]).unwrap();
        h.step();
        assert_eq!(h.client().turn_phase(), TurnPhase::SelectingUnit);
    }

    #[test]
    fn test_refused_client_path_returns_the_turn_to_the_client() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.reach_playing();
        let host_player = h.host().local_player().unwrap();
        let client_player = h.client().local_player().unwrap();
        assert!(h.run_until(h.now + Duration::from_secs(3), |h| {
            unit_of(&h.peers[0], host_player).is_some()
                && unit_of(&h.peers[1], client_player).is_some()
        }));

        let host_unit = unit_of(&h.peers[0], host_player).unwrap();
        h.host().select_unit(host_unit).unwrap();
        h.host().confirm_path(vec![[-300.0, 100.0]]).unwrap();
        h.step();
        assert_eq!(h.client().turn_phase(), TurnPhase::SelectingUnit);

        // The host kills the unit before the client's command arrives.
        let client_unit = unit_of(&h.peers[1], client_player).unwrap();
        h.client().select_unit(client_unit).unwrap();
        let now = h.now;
        let host = h.host();
        let entity = host.world.units.get_mut(&client_unit).unwrap();
        host.units.change_state(entity, UnitState::Dead, now).unwrap();
        h.client().confirm_path(vec![[300.0, 100.0]]).unwrap();
        h.step();

        assert_eq!(h.client().turn_phase(), TurnPhase::SelectingUnit);
        assert_eq!(h.client().current_player(), Some(client_player));
        assert!(h.events(1).contains(&SessionEvent::PathRejected { unit: client_unit }));
        assert_eq!(h.host().turn_phase(), TurnPhase::AwaitingOthers);
        assert_eq!(h.host().current_player(), Some(client_player));
    }

    #[test]
    fn test_unit_attacks_enemy_base_and_dies() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.reach_playing();
        let host_player = h.host().local_player().unwrap();
        assert!(h.run_until(h.now + Duration::from_secs(3), |h| {
            unit_of(&h.peers[0], host_player).is_some()
        }));
        let unit = unit_of(&h.peers[0], host_player).unwrap();
        let client_player = h.client().local_player().unwrap();
        let target = h.host().world().base_owned_by(client_player).unwrap().id;

        h.host().select_unit(unit).unwrap();
        h.host()
            .confirm_path(vec![[0.0, 150.0], [400.0, 150.0], [400.0, 20.0]])
            .unwrap();

        assert!(h.run_until(h.now + Duration::from_secs(20), |h| {
            !h.peers[0].world().units.contains_key(&unit)
                && !h.peers[1].world().units.contains_key(&unit)
        }));

        let expected = 100 - 3 * 10;
        assert_eq!(*h.host().world().bases[&target].health.get(), expected);
        assert_eq!(*h.client().world().bases[&target].health.get(), expected);
        let visuals: Vec<VisualCue> = h
            .events(1)
            .iter()
            .filter_map(|e| match e {
                SessionEvent::UnitVisual { unit: u, cue } if *u == unit => Some(*cue),
                _ => None,
            })
            .collect();
        assert_eq!(
            visuals,
            vec![VisualCue::Walking, VisualCue::Striking, VisualCue::DeathAnimation]
        );
        assert!(h.all_in(MatchPhase::Playing));
    }

    #[test]
    fn test_client_cannot_drive_host_only_operations() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        let client = h.client();

        assert!(matches!(
            client.request_transition(MatchPhase::GameStart),
            Err(SessionError::Authority(_))
        ));
        assert!(client.start_match().is_err());
        assert!(client.request_rematch().is_err());
        assert!(client.seed_lobby_assignments(2, Color::RED, 0).is_err());
        client.set_all_ready(true).unwrap();

        h.step_until(Duration::from_secs(5));
        assert!(h.all_in(MatchPhase::WaitingForPlayers));
    }

    #[test]
    fn test_forged_host_messages_are_dropped() {
        let mut h = Harness::new(&[HOST, 2, 3], &test_config());
        let forger = h.hub.endpoint(3);
        forger
            .send_to(
                2,
                &NetMessage::PhaseReplicated {
                    version: 10,
                    phase: MatchPhase::GameOver,
                },
            )
            .unwrap();
        h.step();
        assert_eq!(h.client().current_phase(), MatchPhase::WaitingForPlayers);
    }

    #[test]
    fn test_disconnect_mid_match_ends_it() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.reach_playing();
        let client_player = h.client().local_player().unwrap();

        h.hub.disconnect(2);
        h.host().on_connection_closed(2).unwrap();
        h.step();

        assert!(!h.host().world().players.contains_key(&client_player));
        assert!(h.host().world().base_owned_by(client_player).is_none());
        assert_eq!(h.host().current_phase(), MatchPhase::GameOver);
        assert_eq!(
            h.host().outcome(),
            Some(MatchOutcome::Winner {
                player: h.host().local_player().unwrap(),
                connection: HOST
            })
        );
    }

    #[test]
    fn test_disconnect_during_countdown_cancels_it() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.host().set_all_ready(true).unwrap();
        h.step();
        h.hub.disconnect(2);
        h.host().on_connection_closed(2).unwrap();
        h.step_until(Duration::from_secs(5));

        assert_eq!(h.host().countdown_remaining(), None);
        assert_eq!(h.host().current_phase(), MatchPhase::WaitingForPlayers);
        assert!(h.events(0).contains(&SessionEvent::CountdownCancelled));
    }

    #[test]
    fn test_late_joiner_receives_deadline() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        h.host().set_all_ready(true).unwrap();
        h.step_until(Duration::from_secs(1));

        let late = PeerSession::new(test_config(), Box::new(h.hub.endpoint(3)), HOST).unwrap();
        h.peers.push(late);
        h.host().on_connection_opened(3).unwrap();
        h.step();

        assert_eq!(
            h.peers[2].countdown_remaining(),
            Some(Duration::from_millis(1900))
        );
    }

    #[test]
    fn test_unanswered_reset_returns_to_lobby() {
        let mut h = Harness::new(&[HOST], &test_config());
        h.host().set_all_ready(true).unwrap();
        assert!(h.run_until(Duration::from_secs(4), |h| {
            h.peers[0].current_phase() == MatchPhase::GameStart
        }));
        let started = h.now;

        assert!(h.run_until(started + Duration::from_secs(6), |h| {
            !h.peers[0].roster_in_flight()
        }));
        assert!(h.now >= started + Duration::from_secs(5));
        assert_eq!(h.host().current_phase(), MatchPhase::WaitingForPlayers);
        assert!(h.events(0).iter().any(|e| matches!(
            e,
            SessionEvent::RosterResetFailed(RosterError::RespawnTimedOut {
                spawned: 1,
                required: 2,
                ..
            })
        )));
        assert!(matches!(h.host().start_match().unwrap(), RosterRun::Started(_)));
    }

    #[test]
    fn test_connection_joining_mid_reset_is_asked_to_spawn() {
        let mut h = Harness::new(&[HOST], &test_config());
        h.host().set_all_ready(true).unwrap();
        assert!(h.run_until(Duration::from_secs(4), |h| {
            h.peers[0].current_phase() == MatchPhase::GameStart
        }));

        let late = PeerSession::new(test_config(), Box::new(h.hub.endpoint(2)), HOST).unwrap();
        h.peers.push(late);
        h.host().on_connection_opened(2).unwrap();

        assert!(h.run_until(h.now + Duration::from_secs(2), |h| h.all_in(MatchPhase::Playing)));
        assert_eq!(h.client().world().players.len(), 2);
        assert!(h.client().local_player().is_some());
    }

    #[test]
    fn test_owner_effects_applied_when_player_arrives_late() {
        let mut h = Harness::new(&[HOST, 2], &test_config());
        let client = h.client();
        client
            .handle_message(
                HOST,
                NetMessage::UnitSpawned {
                    id: 40,
                    owner: 30,
                    position: [0.0, 0.0],
                },
            )
            .unwrap();
        assert!(!client.world().units[&40].physics_ready);

        client
            .handle_message(
                HOST,
                NetMessage::PlayerSpawned {
                    id: 30,
                    connection: 2,
                    slot: 1,
                    color: Color::BLUE,
                    team: 1,
                },
            )
            .unwrap();
        let unit = &client.world().units[&40];
        assert!(unit.physics_ready);
        assert_eq!(unit.tint, Some(Color::BLUE));
        assert!(client.drain_events().contains(&SessionEvent::UnitTinted {
            unit: 40,
            player: 30,
            color: Color::BLUE
        }));
    }
}
