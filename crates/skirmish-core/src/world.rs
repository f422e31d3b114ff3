//! Entities of a match: players, bases and units.
//!
//! Every peer keeps a [`World`]. On the host it is the roster root that the
//! roster reset clears and refills; on other peers it is the local mirror
//! built from replicated messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::authority::AuthorityContext;
use crate::config::MatchConfig;
use crate::replicated::Replicated;
use crate::unit::{Behavior, UnitState};

/// Stable identifier of a replicated entity, shared by all peers.
pub type NetworkId = u32;

/// Identifier of a transport connection (one per peer).
pub type ConnectionId = u64;

/// Team index.
pub type TeamId = u8;

/// RGBA color representation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
}

/// One connected participant.
#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub id: NetworkId,
    pub connection: ConnectionId,
    pub slot: usize,
    pub color: Replicated<Color>,
    pub team: Replicated<TeamId>,
    /// Units whose owner resolved to this player, in resolution order.
    /// Peer-local; never replicated.
    pub units: Vec<NetworkId>,
}

impl PlayerEntity {
    pub fn new(
        id: NetworkId,
        connection: ConnectionId,
        slot: usize,
        color: Color,
        team: TeamId,
        authority: &AuthorityContext,
    ) -> Self {
        Self {
            id,
            connection,
            slot,
            color: Replicated::new(color, authority),
            team: Replicated::new(team, authority),
            units: Vec::new(),
        }
    }
}

/// A producing structure. Bases outlive roster resets; only their owner and
/// health are reset.
#[derive(Debug, Clone)]
pub struct BaseEntity {
    pub id: NetworkId,
    pub slot: usize,
    pub position: [f32; 2],
    pub owner: Replicated<Option<NetworkId>>,
    pub health: Replicated<u32>,
    /// Peer-local switch for the production script.
    pub production_enabled: bool,
    /// Host-only time of the next unit production.
    pub next_production: Option<Duration>,
}

impl BaseEntity {
    pub fn is_alive(&self) -> bool {
        *self.health.get() > 0
    }

    /// Owned and not destroyed.
    pub fn is_standing(&self) -> bool {
        self.owner.get().is_some() && self.is_alive()
    }
}

/// Simulation data of a unit that behaviors read and write.
#[derive(Debug, Clone)]
pub struct UnitBody {
    pub position: Replicated<[f32; 2]>,
    /// Host-only path; movement reaches peers through `position`.
    pub waypoints: Vec<[f32; 2]>,
    /// True until the first path is assigned.
    pub pending: bool,
    /// Base being attacked, set by the contact check before `Attacking`.
    pub target_base: Option<NetworkId>,
}

/// A mobile unit.
pub struct UnitEntity {
    pub id: NetworkId,
    pub owner: Replicated<NetworkId>,
    pub state: Replicated<UnitState>,
    pub body: UnitBody,
    /// Real behavior on the host, visual placeholder elsewhere.
    pub behavior: Box<dyn Behavior>,
    /// Set once the owner resolved and owner effects were applied.
    pub physics_ready: bool,
    pub tint: Option<Color>,
    /// The unit's own base, which it never collides with.
    pub ignore_collision_with: Option<NetworkId>,
}

impl std::fmt::Debug for UnitEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitEntity")
            .field("id", &self.id)
            .field("owner", self.owner.get())
            .field("state", self.state.get())
            .field("position", self.body.position.get())
            .field("pending", &self.body.pending)
            .field("physics_ready", &self.physics_ready)
            .finish_non_exhaustive()
    }
}

impl UnitEntity {
    pub fn is_dead(&self) -> bool {
        *self.state.get() == UnitState::Dead
    }
}

/// Spawn and despawn records kept by the host for replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    PlayerSpawned(NetworkId),
    PlayerDespawned(NetworkId),
    UnitSpawned(NetworkId),
    UnitDespawned(NetworkId),
}

/// All entities known to one peer.
#[derive(Debug)]
pub struct World {
    authority: AuthorityContext,
    pub players: BTreeMap<NetworkId, PlayerEntity>,
    pub bases: BTreeMap<NetworkId, BaseEntity>,
    pub units: BTreeMap<NetworkId, UnitEntity>,
    despawning: Vec<(NetworkId, Duration)>,
    despawn_latency: Duration,
    next_id: NetworkId,
    lifecycle: Vec<Lifecycle>,
}

impl World {
    /// Creates the world with one base per spawn slot.
    ///
    /// Base ids are `1..=slots` on every peer, so bases never need a spawn
    /// message.
    pub fn new(authority: AuthorityContext, config: &MatchConfig) -> Self {
        let mut bases = BTreeMap::new();
        for (slot, spawn) in config.spawn_slots.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let id = slot as NetworkId + 1;
            bases.insert(
                id,
                BaseEntity {
                    id,
                    slot,
                    position: spawn.position,
                    owner: Replicated::new(None, &authority),
                    health: Replicated::new(config.base_health, &authority),
                    production_enabled: false,
                    next_production: None,
                },
            );
        }

        #[allow(clippy::cast_possible_truncation)]
        let next_id = config.spawn_slots.len() as NetworkId + 1;

        Self {
            authority,
            players: BTreeMap::new(),
            bases,
            units: BTreeMap::new(),
            despawning: Vec::new(),
            despawn_latency: config.despawn_latency,
            next_id,
            lifecycle: Vec::new(),
        }
    }

    pub fn authority(&self) -> &AuthorityContext {
        &self.authority
    }

    /// Delay between a player despawn request and its completion.
    pub fn despawn_latency(&self) -> Duration {
        self.despawn_latency
    }

    /// Hands out a fresh network id (host only).
    pub fn allocate_id(&mut self) -> NetworkId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, entry: Lifecycle) {
        if self.authority.is_authority {
            self.lifecycle.push(entry);
        }
    }

    /// Takes spawn/despawn records accumulated since the last call.
    pub fn take_lifecycle(&mut self) -> Vec<Lifecycle> {
        std::mem::take(&mut self.lifecycle)
    }

    // ----------------------------------------------------------------------
    // Players
    // ----------------------------------------------------------------------

    pub fn insert_player(&mut self, player: PlayerEntity) {
        let id = player.id;
        self.players.insert(id, player);
        self.record(Lifecycle::PlayerSpawned(id));
    }

    /// Removes a player immediately.
    pub fn remove_player(&mut self, id: NetworkId) -> Option<PlayerEntity> {
        self.despawning.retain(|(pending, _)| *pending != id);
        let removed = self.players.remove(&id);
        if removed.is_some() {
            self.record(Lifecycle::PlayerDespawned(id));
        }
        removed
    }

    pub fn player_by_connection(&self, connection: ConnectionId) -> Option<&PlayerEntity> {
        self.players.values().find(|p| p.connection == connection)
    }

    /// Asks for every player entity to be destroyed.
    ///
    /// With a zero latency the players are gone on return; otherwise they
    /// stay in the roster until [`World::flush_despawns`] passes their due
    /// time.
    pub fn request_despawn_all_players(&mut self, now: Duration, latency: Duration) {
        let ids: Vec<NetworkId> = self.players.keys().copied().collect();
        if latency.is_zero() {
            for id in ids {
                self.remove_player(id);
            }
            return;
        }

        let due = now + latency;
        for id in ids {
            if !self.despawning.iter().any(|(pending, _)| *pending == id) {
                self.despawning.push((id, due));
            }
        }
    }

    /// Completes despawns whose time has come. Returns the removed ids.
    pub fn flush_despawns(&mut self, now: Duration) -> Vec<NetworkId> {
        let due: Vec<NetworkId> = self
            .despawning
            .iter()
            .filter(|(_, at)| *at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            self.remove_player(*id);
        }
        due
    }

    /// Number of player entities under the roster root, including the ones
    /// still being destroyed.
    pub fn roster_count(&self) -> usize {
        self.players.len()
    }

    /// Player ids ordered by network id.
    pub fn player_order(&self) -> Vec<NetworkId> {
        self.players.keys().copied().collect()
    }

    // ----------------------------------------------------------------------
    // Bases
    // ----------------------------------------------------------------------

    pub fn base_for_slot(&self, slot: usize) -> Option<&BaseEntity> {
        self.bases.values().find(|b| b.slot == slot)
    }

    pub fn base_owned_by(&self, player: NetworkId) -> Option<&BaseEntity> {
        self.bases.values().find(|b| *b.owner.get() == Some(player))
    }

    // ----------------------------------------------------------------------
    // Units
    // ----------------------------------------------------------------------

    pub fn insert_unit(&mut self, unit: UnitEntity) {
        let id = unit.id;
        self.units.insert(id, unit);
        self.record(Lifecycle::UnitSpawned(id));
    }

    pub fn remove_unit(&mut self, id: NetworkId) -> Option<UnitEntity> {
        let removed = self.units.remove(&id);
        if let Some(unit) = &removed {
            if let Some(player) = self.players.get_mut(unit.owner.get()) {
                player.units.retain(|u| *u != id);
            }
            self.record(Lifecycle::UnitDespawned(id));
        }
        removed
    }

    /// Removes every unit.
    pub fn clear_units(&mut self) {
        let ids: Vec<NetworkId> = self.units.keys().copied().collect();
        for id in ids {
            self.remove_unit(id);
        }
    }

    /// Units of `owner` that are not dead.
    pub fn living_units_of(&self, owner: NetworkId) -> usize {
        self.units
            .values()
            .filter(|u| *u.owner.get() == owner && !u.is_dead())
            .count()
    }
}

/// Euclidean distance between two points.
pub fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}
