//! Staged roster reset.
//!
//! Between matches the host tears down every player entity and rebuilds the
//! roster from fresh spawn requests. The stages never overlap:
//!
//! 1. `Despawning`: request destruction of players, remove units, reset bases.
//! 2. `VerifyingClean`: poll the roster root until it is empty, bounded by a
//!    timeout. A timeout aborts the attempt before anyone is notified.
//! 3. `NotifyingClients`: the session broadcasts `ResetAndRequestSpawn`.
//! 4. `AwaitingRespawnRequests`: one player per spawn request until the
//!    required count is reached, bounded by the same timeout.
//!
//! Each attempt carries a UUID so spawn requests for an earlier attempt are
//! recognized and dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authority::AuthorityContext;
use crate::config::{MatchConfig, SpawnSlot};
use crate::error::RosterError;
use crate::world::{Color, ConnectionId, NetworkId, PlayerEntity, TeamId, World};

/// The container whose player entities a reset clears.
pub trait RosterRoot {
    /// Requests destruction of every player entity. Completion may lag.
    fn request_despawn_all(&mut self, now: Duration);

    /// Player entities still present, including ones being destroyed.
    fn player_count(&self) -> usize;
}

impl RosterRoot for World {
    fn request_despawn_all(&mut self, now: Duration) {
        let latency = self.despawn_latency();
        self.request_despawn_all_players(now, latency);
    }

    fn player_count(&self) -> usize {
        self.roster_count()
    }
}

/// Color, team and slot handed to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub slot: usize,
    pub color: Color,
    pub team: TeamId,
}

/// Round-robin slot assignment that survives resets and disconnects.
#[derive(Debug, Clone)]
pub struct SpawnAssignments {
    slots: Vec<SpawnSlot>,
    by_connection: BTreeMap<ConnectionId, Assignment>,
    lobby: BTreeMap<ConnectionId, (Color, TeamId)>,
    next_slot: usize,
}

impl SpawnAssignments {
    pub fn new(slots: Vec<SpawnSlot>) -> Self {
        Self {
            slots,
            by_connection: BTreeMap::new(),
            lobby: BTreeMap::new(),
            next_slot: 0,
        }
    }

    /// Records lobby-chosen color and team, consumed by the first assignment
    /// of that connection.
    pub fn seed_lobby(&mut self, connection: ConnectionId, color: Color, team: TeamId) {
        self.lobby.insert(connection, (color, team));
    }

    pub fn get(&self, connection: ConnectionId) -> Option<Assignment> {
        self.by_connection.get(&connection).copied()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the existing assignment or hands out the next free slot.
    ///
    /// Slots never handed out come first. After that, a slot kept for a
    /// connection that is no longer in `live` is reclaimed and the departed
    /// connection loses its assignment. With every slot held by a live
    /// connection the request fails.
    pub fn assign(
        &mut self,
        connection: ConnectionId,
        live: &[ConnectionId],
    ) -> Result<Assignment, RosterError> {
        if let Some(existing) = self.by_connection.get(&connection) {
            return Ok(*existing);
        }
        if self.slots.is_empty() {
            return Err(RosterError::MissingRoot);
        }

        let count = self.slots.len();
        let assigned: BTreeSet<usize> = self.by_connection.values().map(|a| a.slot).collect();
        let held_live: BTreeSet<usize> = self
            .by_connection
            .iter()
            .filter(|(c, _)| live.contains(c))
            .map(|(_, a)| a.slot)
            .collect();
        let round_robin = |taken: &BTreeSet<usize>| {
            (0..count)
                .map(|offset| (self.next_slot + offset) % count)
                .find(|slot| !taken.contains(slot))
        };
        let Some(slot) = round_robin(&assigned).or_else(|| round_robin(&held_live)) else {
            let err = RosterError::NoFreeSlot {
                connection,
                slots: count,
            };
            tracing::error!("[roster] {}", err);
            return Err(err);
        };
        self.next_slot = (slot + 1) % count;

        let departed: Vec<ConnectionId> = self
            .by_connection
            .iter()
            .filter(|(_, a)| a.slot == slot)
            .map(|(c, _)| *c)
            .collect();
        for previous in departed {
            tracing::info!(
                "[roster] Slot {} reclaimed from departed connection {}",
                slot,
                previous
            );
            self.by_connection.remove(&previous);
        }

        let defaults = &self.slots[slot];
        let (color, team) = self
            .lobby
            .remove(&connection)
            .unwrap_or((defaults.color, defaults.team));
        let assignment = Assignment { slot, color, team };
        self.by_connection.insert(connection, assignment);
        tracing::debug!("[roster] Connection {} assigned {:?}", connection, assignment);
        Ok(assignment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RosterPhase {
    Despawning,
    VerifyingClean,
    NotifyingClients,
    AwaitingRespawnRequests,
}

/// Result of [`RosterResetProtocol::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterRun {
    Started(Uuid),
    AlreadyInFlight,
}

/// What the session has to do after a roster tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterProgress {
    /// No reset in flight.
    Idle,
    /// Still waiting for cleanup or spawn requests.
    Pending,
    /// Cleanup verified; broadcast the reset for this attempt.
    Notify(Uuid),
    /// Every required player spawned; hand over to Playing.
    Completed,
    /// Attempt aborted.
    Failed(RosterError),
}

/// A handled spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnOutcome {
    pub player: NetworkId,
    /// Player replaced by this request, if the connection already had one.
    pub replaced: Option<NetworkId>,
    pub complete: bool,
}

#[derive(Debug)]
struct Attempt {
    id: Uuid,
    phase: RosterPhase,
    started_at: Duration,
    next_poll: Duration,
    /// When the attempt entered AwaitingRespawnRequests.
    notified_at: Duration,
    spawned: BTreeSet<ConnectionId>,
}

#[derive(Debug)]
pub struct RosterResetProtocol {
    authority: AuthorityContext,
    enabled: bool,
    poll_interval: Duration,
    timeout: Duration,
    min_players: usize,
    base_health: u32,
    assignments: SpawnAssignments,
    attempt: Option<Attempt>,
    last_completed: Option<Uuid>,
}

impl RosterResetProtocol {
    pub fn new(authority: AuthorityContext, config: &MatchConfig) -> Self {
        let enabled = !config.spawn_slots.is_empty();
        if !enabled {
            tracing::error!("[roster] {}", RosterError::MissingRoot);
        }
        Self {
            authority,
            enabled,
            poll_interval: config.roster_poll_interval,
            timeout: config.roster_timeout,
            min_players: config.min_players,
            base_health: config.base_health,
            assignments: SpawnAssignments::new(config.spawn_slots.clone()),
            attempt: None,
            last_completed: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.attempt.is_some()
    }

    pub fn phase(&self) -> Option<RosterPhase> {
        self.attempt.as_ref().map(|a| a.phase)
    }

    pub fn attempt_id(&self) -> Option<Uuid> {
        self.attempt.as_ref().map(|a| a.id)
    }

    pub fn last_completed(&self) -> Option<Uuid> {
        self.last_completed
    }

    pub fn assignments(&self) -> &SpawnAssignments {
        &self.assignments
    }

    pub fn assignments_mut(&mut self) -> &mut SpawnAssignments {
        &mut self.assignments
    }

    /// Number of players a reset waits for: every live connection, at least
    /// `min_players`, never more than there are spawn slots.
    pub fn required_players(&self, connected: usize) -> usize {
        connected
            .max(self.min_players)
            .min(self.assignments.slot_count())
    }

    /// Starts a reset and performs the Despawning stage.
    pub fn run(&mut self, world: &mut World, now: Duration) -> Result<RosterRun, RosterError> {
        self.authority.ensure_authority("run roster reset")?;
        if !self.enabled {
            tracing::error!("[roster] {}", RosterError::MissingRoot);
            return Err(RosterError::MissingRoot);
        }
        if let Some(attempt) = &self.attempt {
            tracing::info!("[roster] Reset {} already in flight", attempt.id);
            return Ok(RosterRun::AlreadyInFlight);
        }

        let id = Uuid::new_v4();
        tracing::info!(
            "[roster] Reset {} started, despawning {} player(s)",
            id,
            world.player_count()
        );

        world.clear_units();
        for base in world.bases.values_mut() {
            base.owner.set(None)?;
            base.health.set(self.base_health)?;
            base.production_enabled = false;
            base.next_production = None;
        }
        world.request_despawn_all(now);

        self.attempt = Some(Attempt {
            id,
            phase: RosterPhase::VerifyingClean,
            started_at: now,
            next_poll: now,
            notified_at: now,
            spawned: BTreeSet::new(),
        });
        Ok(RosterRun::Started(id))
    }

    /// Advances the reset. `connected` is the number of live connections,
    /// host included.
    pub fn tick(&mut self, world: &World, now: Duration, connected: usize) -> RosterProgress {
        let required = self.required_players(connected);
        let Some(attempt) = self.attempt.as_mut() else {
            return RosterProgress::Idle;
        };

        match attempt.phase {
            RosterPhase::Despawning | RosterPhase::NotifyingClients => RosterProgress::Pending,
            RosterPhase::VerifyingClean => {
                if now < attempt.next_poll {
                    return RosterProgress::Pending;
                }
                attempt.next_poll = now + self.poll_interval;

                let remaining = world.player_count();
                if remaining == 0 {
                    attempt.phase = RosterPhase::NotifyingClients;
                    tracing::info!("[roster] Reset {} verified clean, notifying peers", attempt.id);
                    let id = attempt.id;
                    attempt.phase = RosterPhase::AwaitingRespawnRequests;
                    attempt.notified_at = now;
                    return RosterProgress::Notify(id);
                }

                if now.saturating_sub(attempt.started_at) >= self.timeout {
                    #[allow(clippy::cast_possible_truncation)]
                    let err = RosterError::CleanupTimedOut {
                        timeout_ms: self.timeout.as_millis() as u64,
                        remaining,
                    };
                    tracing::error!("[roster] Reset {} aborted: {}", attempt.id, err);
                    self.attempt = None;
                    return RosterProgress::Failed(err);
                }

                tracing::debug!("[roster] {} player(s) still present", remaining);
                RosterProgress::Pending
            }
            RosterPhase::AwaitingRespawnRequests => {
                let spawned = attempt.spawned.len();
                if spawned >= required {
                    self.finish();
                    return RosterProgress::Completed;
                }
                if now.saturating_sub(attempt.notified_at) >= self.timeout {
                    #[allow(clippy::cast_possible_truncation)]
                    let err = RosterError::RespawnTimedOut {
                        timeout_ms: self.timeout.as_millis() as u64,
                        spawned,
                        required,
                    };
                    tracing::error!("[roster] Reset {} aborted: {}", attempt.id, err);
                    self.attempt = None;
                    return RosterProgress::Failed(err);
                }
                RosterProgress::Pending
            }
        }
    }

    /// Spawns the player for `connection`.
    ///
    /// `connected` lists the live connections, host included.
    pub fn handle_spawn_request(
        &mut self,
        world: &mut World,
        connection: ConnectionId,
        attempt_id: Uuid,
        connected: &[ConnectionId],
    ) -> Result<SpawnOutcome, RosterError> {
        self.authority.ensure_authority("handle spawn request")?;

        let attempt = match self.attempt.as_ref() {
            Some(a) if a.phase == RosterPhase::AwaitingRespawnRequests => a,
            _ => return Err(RosterError::NotAwaitingSpawns),
        };
        if attempt.id != attempt_id {
            tracing::warn!(
                "[roster] Dropping spawn request from {} for stale attempt {}",
                connection,
                attempt_id
            );
            return Err(RosterError::StaleAttempt(connection));
        }
        if !connected.contains(&connection) {
            tracing::warn!("[roster] Spawn request from unknown connection {}", connection);
            return Err(RosterError::UnknownConnection(connection));
        }

        let assignment = self.assignments.assign(connection, connected)?;

        let replaced = world.player_by_connection(connection).map(|p| p.id);
        if let Some(previous) = replaced {
            tracing::warn!(
                "[roster] Connection {} spawned twice, replacing player {}",
                connection,
                previous
            );
            world.remove_player(previous);
        }

        let id = world.allocate_id();
        let authority = *world.authority();
        world.insert_player(PlayerEntity::new(
            id,
            connection,
            assignment.slot,
            assignment.color,
            assignment.team,
            &authority,
        ));

        if let Some(base) = world.bases.values_mut().find(|b| b.slot == assignment.slot) {
            base.owner.set(Some(id))?;
            base.health.set(self.base_health)?;
        }
        tracing::info!(
            "[roster] Spawned player {} for connection {} in slot {}",
            id,
            connection,
            assignment.slot
        );

        let required = self.required_players(connected.len());
        let complete = match self.attempt.as_mut() {
            Some(attempt) => {
                attempt.spawned.insert(connection);
                attempt.spawned.len() >= required
            }
            None => false,
        };
        if complete {
            self.finish();
        }

        Ok(SpawnOutcome {
            player: id,
            replaced,
            complete,
        })
    }

    fn finish(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            tracing::info!(
                "[roster] Reset {} complete with {} player(s)",
                attempt.id,
                attempt.spawned.len()
            );
            self.last_completed = Some(attempt.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitStateReplicator;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn host_setup(config: &MatchConfig) -> (World, RosterResetProtocol) {
        let authority = AuthorityContext::host(1);
        (
            World::new(authority, config),
            RosterResetProtocol::new(authority, config),
        )
    }

    /// Runs the reset to the point where spawn requests are accepted.
    fn reach_awaiting(world: &mut World, roster: &mut RosterResetProtocol) -> Uuid {
        roster.run(world, Duration::ZERO).unwrap();
        match roster.tick(world, Duration::ZERO, 2) {
            RosterProgress::Notify(id) => id,
            other => panic!("expected Notify, got {other:?}"),
        }
    }

    #[test]
    fn test_full_reset_spawns_one_player_per_connection() {
        let config = MatchConfig::default();
        let (mut world, mut roster) = host_setup(&config);
        let attempt = reach_awaiting(&mut world, &mut roster);

        let first = roster.handle_spawn_request(&mut world, 1, attempt, &[1, 2]).unwrap();
        assert!(!first.complete);
        let second = roster.handle_spawn_request(&mut world, 2, attempt, &[1, 2]).unwrap();
        assert!(second.complete);

        assert!(!roster.is_in_flight());
        assert_eq!(roster.last_completed(), Some(attempt));
        assert_eq!(world.roster_count(), 2);
        assert_eq!(*world.bases[&1].owner.get(), Some(first.player));
        assert_eq!(*world.bases[&2].owner.get(), Some(second.player));
        assert_eq!(*world.players[&first.player].color.get(), Color::RED);
        assert_eq!(*world.players[&second.player].color.get(), Color::BLUE);
    }

    #[test]
    fn test_second_run_is_guarded() {
        let config = MatchConfig::default();
        let (mut world, mut roster) = host_setup(&config);

        assert!(matches!(roster.run(&mut world, Duration::ZERO), Ok(RosterRun::Started(_))));
        assert_eq!(roster.run(&mut world, Duration::ZERO), Ok(RosterRun::AlreadyInFlight));
    }

    #[test]
    fn test_reset_keeps_assignments_across_attempts() {
        let config = MatchConfig::default();
        let (mut world, mut roster) = host_setup(&config);
        let attempt = reach_awaiting(&mut world, &mut roster);
        // Connection 2 asks first this time around.
        roster.handle_spawn_request(&mut world, 2, attempt, &[1, 2]).unwrap();
        roster.handle_spawn_request(&mut world, 1, attempt, &[1, 2]).unwrap();
        let before = (roster.assignments().get(1), roster.assignments().get(2));

        let attempt = reach_awaiting(&mut world, &mut roster);
        roster.handle_spawn_request(&mut world, 1, attempt, &[1, 2]).unwrap();
        roster.handle_spawn_request(&mut world, 2, attempt, &[1, 2]).unwrap();

        assert_eq!((roster.assignments().get(1), roster.assignments().get(2)), before);
        assert_eq!(world.roster_count(), 2);
        let colors: Vec<Color> = [1, 2]
            .iter()
            .map(|c| *world.player_by_connection(*c).unwrap().color.get())
            .collect();
        assert_eq!(colors, vec![Color::BLUE, Color::RED]);
    }

    #[test]
    fn test_despawning_clears_units_and_restores_bases() {
        let config = MatchConfig::default();
        let (mut world, mut roster) = host_setup(&config);
        let units = UnitStateReplicator::new(*world.authority(), &config);
        world.insert_unit(units.create_unit(50, 9, [0.0, 0.0]));
        {
            let base = world.bases.get_mut(&1).unwrap();
            base.owner.set(Some(9)).unwrap();
            base.health.set(10).unwrap();
            base.production_enabled = true;
        }

        roster.run(&mut world, Duration::ZERO).unwrap();

        assert!(world.units.is_empty());
        let base = &world.bases[&1];
        assert_eq!(*base.owner.get(), None);
        assert_eq!(*base.health.get(), config.base_health);
        assert!(!base.production_enabled);
    }

    #[test]
    fn test_slow_cleanup_times_out_before_notify() {
        let config = MatchConfig {
            despawn_latency: secs(6.0),
            ..MatchConfig::default()
        };
        let (mut world, mut roster) = host_setup(&config);
        let authority = *world.authority();
        world.insert_player(PlayerEntity::new(10, 1, 0, Color::RED, 0, &authority));
        world.insert_player(PlayerEntity::new(11, 2, 1, Color::BLUE, 1, &authority));

        roster.run(&mut world, Duration::ZERO).unwrap();

        let mut now = Duration::ZERO;
        let failure = loop {
            world.flush_despawns(now);
            match roster.tick(&world, now, 2) {
                RosterProgress::Pending => {}
                RosterProgress::Failed(err) => break (now, err),
                other => panic!("unexpected progress {other:?}"),
            }
            now += Duration::from_millis(100);
        };

        assert_eq!(
            failure.1,
            RosterError::CleanupTimedOut {
                timeout_ms: 5000,
                remaining: 2
            }
        );
        assert!(failure.0 >= secs(5.0) && failure.0 < secs(6.0));
        assert!(!roster.is_in_flight());

        // Cleanup finishes at 6 s; a retry at 8 s goes straight through.
        world.flush_despawns(secs(6.0));
        assert_eq!(world.roster_count(), 0);
        roster.run(&mut world, secs(8.0)).unwrap();
        assert!(matches!(roster.tick(&world, secs(8.0), 2), RosterProgress::Notify(_)));
    }

    #[test]
    fn test_spawn_request_validation() {
        let config = MatchConfig::default();
        let (mut world, mut roster) = host_setup(&config);

        assert_eq!(
            roster.handle_spawn_request(&mut world, 1, Uuid::new_v4(), &[1, 2]),
            Err(RosterError::NotAwaitingSpawns)
        );

        let attempt = reach_awaiting(&mut world, &mut roster);
        assert_eq!(
            roster.handle_spawn_request(&mut world, 2, Uuid::new_v4(), &[1, 2]),
            Err(RosterError::StaleAttempt(2))
        );
        assert_eq!(
            roster.handle_spawn_request(&mut world, 7, attempt, &[1, 2]),
            Err(RosterError::UnknownConnection(7))
        );
        assert_eq!(world.roster_count(), 0);
    }

    #[test]
    fn test_double_spawn_replaces_entity() {
        let config = MatchConfig {
            min_players: 3,
            ..MatchConfig::default()
        };
        let (mut world, mut roster) = host_setup(&config);
        let attempt = reach_awaiting(&mut world, &mut roster);

        let first = roster.handle_spawn_request(&mut world, 2, attempt, &[1, 2]).unwrap();
        let second = roster.handle_spawn_request(&mut world, 2, attempt, &[1, 2]).unwrap();

        assert_eq!(second.replaced, Some(first.player));
        assert!(!world.players.contains_key(&first.player));
        assert_eq!(world.roster_count(), 1);
        let player = &world.players[&second.player];
        assert_eq!(player.slot, 0);
        assert_eq!(*player.color.get(), Color::RED);
    }

    #[test]
    fn test_lobby_seed_overrides_slot_defaults() {
        let mut assignments = SpawnAssignments::new(MatchConfig::default().spawn_slots);
        assignments.seed_lobby(3, Color::WHITE, 7);

        let a = assignments.assign(3, &[3, 4]).unwrap();
        assert_eq!((a.slot, a.color, a.team), (0, Color::WHITE, 7));
        let b = assignments.assign(4, &[3, 4]).unwrap();
        assert_eq!((b.slot, b.color, b.team), (1, Color::BLUE, 1));
    }

    fn two_slots() -> MatchConfig {
        let mut config = MatchConfig::default();
        config.spawn_slots.truncate(2);
        config
    }

    #[test]
    fn test_full_slots_refuse_extra_connection() {
        let config = two_slots();
        let (mut world, mut roster) = host_setup(&config);
        let attempt = reach_awaiting(&mut world, &mut roster);
        let connected = [1, 2, 3];
        assert_eq!(roster.required_players(connected.len()), 2);

        let host = roster.handle_spawn_request(&mut world, 1, attempt, &connected).unwrap();
        let second = roster.handle_spawn_request(&mut world, 2, attempt, &connected).unwrap();
        assert!(second.complete);
        assert_eq!(
            roster.assignments_mut().assign(3, &connected),
            Err(RosterError::NoFreeSlot {
                connection: 3,
                slots: 2
            })
        );

        assert_eq!(world.roster_count(), 2);
        assert_eq!(world.base_owned_by(host.player).map(|b| b.slot), Some(0));
        assert_eq!(world.base_owned_by(second.player).map(|b| b.slot), Some(1));
    }

    #[test]
    fn test_departed_connection_slot_is_reclaimed() {
        let mut assignments = SpawnAssignments::new(two_slots().spawn_slots);
        assignments.assign(1, &[1, 2]).unwrap();
        assert_eq!(assignments.assign(2, &[1, 2]).unwrap().slot, 1);

        // Connection 2 left and 5 joined in its place.
        assert!(assignments.assign(6, &[1, 5, 6]).is_ok_and(|a| a.slot == 1));
        assert_eq!(assignments.get(2), None);
        assert_eq!(
            assignments.assign(5, &[1, 5, 6]),
            Err(RosterError::NoFreeSlot {
                connection: 5,
                slots: 2
            })
        );
        assert_eq!(assignments.get(1).map(|a| a.slot), Some(0));
    }

    #[test]
    fn test_unanswered_respawn_times_out() {
        let config = MatchConfig::default();
        let (mut world, mut roster) = host_setup(&config);
        let attempt = reach_awaiting(&mut world, &mut roster);
        roster.handle_spawn_request(&mut world, 1, attempt, &[1]).unwrap();

        assert_eq!(roster.tick(&world, secs(4.9), 1), RosterProgress::Pending);
        assert_eq!(
            roster.tick(&world, secs(5.0), 1),
            RosterProgress::Failed(RosterError::RespawnTimedOut {
                timeout_ms: 5000,
                spawned: 1,
                required: 2
            })
        );
        assert!(!roster.is_in_flight());
        assert!(matches!(roster.run(&mut world, secs(6.0)), Ok(RosterRun::Started(_))));
    }

    #[test]
    fn test_missing_root_disables_reset() {
        let config = MatchConfig {
            spawn_slots: Vec::new(),
            ..MatchConfig::default()
        };
        let (mut world, mut roster) = host_setup(&config);
        assert_eq!(roster.run(&mut world, Duration::ZERO), Err(RosterError::MissingRoot));
        assert!(!roster.is_in_flight());
    }

    #[test]
    fn test_client_cannot_run_reset() {
        let authority = AuthorityContext::client(2, 1);
        let config = MatchConfig::default();
        let mut world = World::new(authority, &config);
        let mut roster = RosterResetProtocol::new(authority, &config);
        assert!(matches!(
            roster.run(&mut world, Duration::ZERO),
            Err(RosterError::Authority(_))
        ));
    }
}
