//! Owner resolution for units.
//!
//! A unit only carries the network id of its owning player. Spawn order
//! between peers is not guaranteed, so the player may not exist locally yet
//! when the unit does. Resolution never blocks: a miss parks the unit under
//! the owner id until [`EntityOwnershipRegistry::on_player_spawned`] runs for
//! that owner.

use std::collections::{BTreeMap, BTreeSet};

use crate::world::{Color, NetworkId, PlayerEntity, World};

/// Owner-dependent effects applied to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerResolved {
    pub unit: NetworkId,
    pub player: NetworkId,
    pub tint: Color,
    pub ignore_collision_with: Option<NetworkId>,
}

#[derive(Debug, Default)]
pub struct EntityOwnershipRegistry {
    /// Owner id -> units waiting for that owner to spawn locally.
    pending: BTreeMap<NetworkId, BTreeSet<NetworkId>>,
}

impl EntityOwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the live local player for `owner`.
    pub fn resolve<'w>(&self, world: &'w World, owner: NetworkId) -> Option<&'w PlayerEntity> {
        world.players.get(&owner)
    }

    /// Re-resolves `unit` after its replicated owner id changed.
    ///
    /// Returns the applied effects, or `None` if the owner is not spawned yet
    /// (the unit is then retried from [`Self::on_player_spawned`]).
    pub fn on_owner_id_changed(
        &mut self,
        world: &mut World,
        unit: NetworkId,
        previous: Option<NetworkId>,
        next: NetworkId,
    ) -> Option<OwnerResolved> {
        if let Some(previous) = previous.filter(|p| *p != next) {
            self.unpark(previous, unit);
            if let Some(player) = world.players.get_mut(&previous) {
                player.units.retain(|u| *u != unit);
            }
        }

        if !world.units.contains_key(&unit) {
            tracing::debug!("[registry] Unit {} no longer exists", unit);
            return None;
        }

        if self.resolve(world, next).is_none() {
            tracing::debug!("[registry] Owner {} of unit {} not spawned yet", next, unit);
            if let Some(unit_entity) = world.units.get_mut(&unit) {
                unit_entity.physics_ready = false;
            }
            self.pending.entry(next).or_default().insert(unit);
            return None;
        }

        self.unpark(next, unit);
        Self::apply(world, unit, next)
    }

    /// Retries every unit parked under `player`.
    pub fn on_player_spawned(&mut self, world: &mut World, player: NetworkId) -> Vec<OwnerResolved> {
        let Some(waiting) = self.pending.remove(&player) else {
            return Vec::new();
        };
        tracing::debug!(
            "[registry] Player {} spawned, resolving {} waiting unit(s)",
            player,
            waiting.len()
        );
        waiting
            .into_iter()
            .filter_map(|unit| Self::apply(world, unit, player))
            .collect()
    }

    /// Drops any waiting entry for a unit that left the world.
    pub fn forget_unit(&mut self, unit: NetworkId) {
        self.pending.retain(|_, units| {
            units.remove(&unit);
            !units.is_empty()
        });
    }

    /// Number of units still waiting for their owner.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(BTreeSet::len).sum()
    }

    pub fn is_pending(&self, unit: NetworkId) -> bool {
        self.pending.values().any(|units| units.contains(&unit))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn unpark(&mut self, owner: NetworkId, unit: NetworkId) {
        if let Some(units) = self.pending.get_mut(&owner) {
            units.remove(&unit);
            if units.is_empty() {
                self.pending.remove(&owner);
            }
        }
    }

    /// Tint and collision-ignore go in first; physics readiness is set last.
    fn apply(world: &mut World, unit: NetworkId, player: NetworkId) -> Option<OwnerResolved> {
        let tint = *world.players.get(&player)?.color.get();
        let own_base = world.base_owned_by(player).map(|b| b.id);

        let unit_entity = world.units.get_mut(&unit)?;
        if *unit_entity.owner.get() != player {
            return None;
        }
        unit_entity.tint = Some(tint);
        unit_entity.ignore_collision_with = own_base;

        if let Some(owner) = world.players.get_mut(&player) {
            if !owner.units.contains(&unit) {
                owner.units.push(unit);
            }
        }

        if let Some(unit_entity) = world.units.get_mut(&unit) {
            unit_entity.physics_ready = true;
        }

        tracing::debug!("[registry] Unit {} resolved to player {}", unit, player);
        Some(OwnerResolved {
            unit,
            player,
            tint,
            ignore_collision_with: own_base,
        })
    }
}
