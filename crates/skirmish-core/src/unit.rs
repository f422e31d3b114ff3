//! Unit state machine and its replication.
//!
//! The host runs a real [`Behavior`] per unit. Only the [`UnitState`]
//! discriminant is replicated; other peers rebuild a visual placeholder from
//! it. Which object backs which discriminant is decided by two lookup tables,
//! one for the host and one for everybody else.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::authority::AuthorityContext;
use crate::config::MatchConfig;
use crate::error::UnitError;
use crate::replicated::{Replicated, ValueChange};
use crate::world::{NetworkId, UnitBody, UnitEntity, distance};

/// Replicated discriminant of a unit's behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    Idle,
    GoToLocation,
    FollowingPath,
    Attacking,
    Dead,
}

impl UnitState {
    pub const ALL: [UnitState; 5] = [
        Self::Idle,
        Self::GoToLocation,
        Self::FollowingPath,
        Self::Attacking,
        Self::Dead,
    ];

    /// Position of this discriminant in the behavior tables.
    pub const fn index(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::GoToLocation => 1,
            Self::FollowingPath => 2,
            Self::Attacking => 3,
            Self::Dead => 4,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Dead)
    }

    /// States in which a unit accepts a new path.
    pub const fn accepts_path(self) -> bool {
        matches!(self, Self::Idle | Self::GoToLocation)
    }
}

/// Peer-side visual reaction to a discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualCue {
    Standing,
    Walking,
    Striking,
    /// Play the death animation and stop taking input for the unit.
    DeathAnimation,
}

impl VisualCue {
    pub const fn for_state(state: UnitState) -> Self {
        match state {
            UnitState::Idle => Self::Standing,
            UnitState::GoToLocation | UnitState::FollowingPath => Self::Walking,
            UnitState::Attacking => Self::Striking,
            UnitState::Dead => Self::DeathAnimation,
        }
    }
}

/// Unit numbers taken from [`MatchConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitTuning {
    pub speed: f32,
    pub damage: u32,
    pub attack_interval: Duration,
    pub attack_hits: u32,
    pub corpse_linger: Duration,
}

impl UnitTuning {
    pub fn from_config(config: &MatchConfig) -> Self {
        Self {
            speed: config.unit_speed,
            damage: config.unit_damage,
            attack_interval: config.attack_interval,
            attack_hits: config.attack_hits,
            corpse_linger: config.corpse_linger,
        }
    }
}

/// Inputs available to a behavior during a call.
#[derive(Debug, Clone, Copy)]
pub struct BehaviorContext<'a> {
    pub now: Duration,
    pub dt: Duration,
    pub tuning: &'a UnitTuning,
}

/// Damage dealt to a base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strike {
    pub unit: NetworkId,
    pub base: NetworkId,
    pub damage: u32,
}

/// What a behavior asks for after a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviorOutcome {
    pub next: Option<UnitState>,
    pub strike: Option<(NetworkId, u32)>,
    pub despawn: bool,
}

/// One variant of unit behavior.
pub trait Behavior: Send + Sync {
    fn state(&self) -> UnitState;

    fn enter(&mut self, _body: &mut UnitBody, _ctx: &BehaviorContext<'_>) {}

    fn exit(&mut self, _body: &mut UnitBody, _ctx: &BehaviorContext<'_>) {}

    fn tick(&mut self, body: &mut UnitBody, ctx: &BehaviorContext<'_>) -> BehaviorOutcome;

    /// False for placeholders, which must never drive game logic.
    fn is_authoritative(&self) -> bool {
        true
    }

    fn cue(&self) -> VisualCue {
        VisualCue::for_state(self.state())
    }
}

fn write_position(body: &mut UnitBody, position: [f32; 2]) {
    if let Err(err) = body.position.set(position) {
        tracing::warn!("[unit] Position write rejected: {}", err);
    }
}

/// Moves `body` towards `target` by at most `budget`. Returns the distance
/// left over if the target was reached.
fn step_towards(body: &mut UnitBody, target: [f32; 2], budget: f32) -> Option<f32> {
    let from = *body.position.get();
    let gap = distance(from, target);
    if gap <= budget {
        write_position(body, target);
        return Some(budget - gap);
    }
    let t = budget / gap;
    write_position(
        body,
        [from[0] + (target[0] - from[0]) * t, from[1] + (target[1] - from[1]) * t],
    );
    None
}

fn move_budget(ctx: &BehaviorContext<'_>) -> f32 {
    ctx.tuning.speed * ctx.dt.as_secs_f32()
}

// ============================================================================
// Host behaviors
// ============================================================================

#[derive(Debug, Default)]
struct Idle;

impl Behavior for Idle {
    fn state(&self) -> UnitState {
        UnitState::Idle
    }

    fn tick(&mut self, _body: &mut UnitBody, _ctx: &BehaviorContext<'_>) -> BehaviorOutcome {
        BehaviorOutcome::default()
    }
}

/// Straight line to the first waypoint.
#[derive(Debug, Default)]
struct GoToLocation;

impl Behavior for GoToLocation {
    fn state(&self) -> UnitState {
        UnitState::GoToLocation
    }

    fn tick(&mut self, body: &mut UnitBody, ctx: &BehaviorContext<'_>) -> BehaviorOutcome {
        let Some(target) = body.waypoints.first().copied() else {
            return BehaviorOutcome {
                next: Some(UnitState::Idle),
                ..BehaviorOutcome::default()
            };
        };
        if step_towards(body, target, move_budget(ctx)).is_some() {
            body.waypoints.clear();
            return BehaviorOutcome {
                next: Some(UnitState::Idle),
                ..BehaviorOutcome::default()
            };
        }
        BehaviorOutcome::default()
    }
}

#[derive(Debug, Default)]
struct FollowingPath {
    next_index: usize,
}

impl Behavior for FollowingPath {
    fn state(&self) -> UnitState {
        UnitState::FollowingPath
    }

    fn enter(&mut self, _body: &mut UnitBody, _ctx: &BehaviorContext<'_>) {
        self.next_index = 0;
    }

    fn exit(&mut self, body: &mut UnitBody, _ctx: &BehaviorContext<'_>) {
        body.waypoints.clear();
    }

    fn tick(&mut self, body: &mut UnitBody, ctx: &BehaviorContext<'_>) -> BehaviorOutcome {
        let mut budget = move_budget(ctx);
        while let Some(target) = body.waypoints.get(self.next_index).copied() {
            match step_towards(body, target, budget) {
                Some(left) => {
                    self.next_index += 1;
                    budget = left;
                }
                None => return BehaviorOutcome::default(),
            }
        }
        BehaviorOutcome {
            next: Some(UnitState::Idle),
            ..BehaviorOutcome::default()
        }
    }
}

#[derive(Debug, Default)]
struct Attacking {
    hits_left: u32,
    next_hit_at: Duration,
}

impl Behavior for Attacking {
    fn state(&self) -> UnitState {
        UnitState::Attacking
    }

    fn enter(&mut self, body: &mut UnitBody, ctx: &BehaviorContext<'_>) {
        self.hits_left = ctx.tuning.attack_hits;
        self.next_hit_at = ctx.now;
        body.waypoints.clear();
    }

    fn exit(&mut self, body: &mut UnitBody, _ctx: &BehaviorContext<'_>) {
        body.target_base = None;
    }

    fn tick(&mut self, body: &mut UnitBody, ctx: &BehaviorContext<'_>) -> BehaviorOutcome {
        let Some(base) = body.target_base else {
            return BehaviorOutcome {
                next: Some(UnitState::Idle),
                ..BehaviorOutcome::default()
            };
        };
        if ctx.now < self.next_hit_at {
            return BehaviorOutcome::default();
        }

        self.hits_left = self.hits_left.saturating_sub(1);
        self.next_hit_at += ctx.tuning.attack_interval;
        BehaviorOutcome {
            next: (self.hits_left == 0).then_some(UnitState::Dead),
            strike: Some((base, ctx.tuning.damage)),
            despawn: false,
        }
    }
}

#[derive(Debug, Default)]
struct Dead {
    died_at: Duration,
}

impl Behavior for Dead {
    fn state(&self) -> UnitState {
        UnitState::Dead
    }

    fn enter(&mut self, body: &mut UnitBody, ctx: &BehaviorContext<'_>) {
        self.died_at = ctx.now;
        body.waypoints.clear();
        body.target_base = None;
    }

    fn tick(&mut self, _body: &mut UnitBody, ctx: &BehaviorContext<'_>) -> BehaviorOutcome {
        BehaviorOutcome {
            despawn: ctx.now >= self.died_at + ctx.tuning.corpse_linger,
            ..BehaviorOutcome::default()
        }
    }
}

// ============================================================================
// Peer placeholder
// ============================================================================

/// Visual-only stand-in built on non-host peers.
#[derive(Debug)]
pub struct Placeholder {
    state: UnitState,
}

impl Behavior for Placeholder {
    fn state(&self) -> UnitState {
        self.state
    }

    fn tick(&mut self, _body: &mut UnitBody, _ctx: &BehaviorContext<'_>) -> BehaviorOutcome {
        BehaviorOutcome::default()
    }

    fn is_authoritative(&self) -> bool {
        false
    }
}

// ============================================================================
// Lookup tables
// ============================================================================

type BehaviorCtor = fn() -> Box<dyn Behavior>;

fn host_idle() -> Box<dyn Behavior> {
    Box::new(Idle)
}

fn host_go_to_location() -> Box<dyn Behavior> {
    Box::new(GoToLocation)
}

fn host_following_path() -> Box<dyn Behavior> {
    Box::new(FollowingPath::default())
}

fn host_attacking() -> Box<dyn Behavior> {
    Box::new(Attacking::default())
}

fn host_dead() -> Box<dyn Behavior> {
    Box::new(Dead::default())
}

fn peer_idle() -> Box<dyn Behavior> {
    Box::new(Placeholder { state: UnitState::Idle })
}

fn peer_go_to_location() -> Box<dyn Behavior> {
    Box::new(Placeholder {
        state: UnitState::GoToLocation,
    })
}

fn peer_following_path() -> Box<dyn Behavior> {
    Box::new(Placeholder {
        state: UnitState::FollowingPath,
    })
}

fn peer_attacking() -> Box<dyn Behavior> {
    Box::new(Placeholder {
        state: UnitState::Attacking,
    })
}

fn peer_dead() -> Box<dyn Behavior> {
    Box::new(Placeholder { state: UnitState::Dead })
}

/// Indexed by [`UnitState::index`].
const HOST_BEHAVIORS: [BehaviorCtor; 5] = [
    host_idle,
    host_go_to_location,
    host_following_path,
    host_attacking,
    host_dead,
];

/// Indexed by [`UnitState::index`].
const PEER_PLACEHOLDERS: [BehaviorCtor; 5] = [
    peer_idle,
    peer_go_to_location,
    peer_following_path,
    peer_attacking,
    peer_dead,
];

// ============================================================================
// Replicator
// ============================================================================

/// Drives unit state changes and mirrors them on peers.
#[derive(Debug, Clone)]
pub struct UnitStateReplicator {
    authority: AuthorityContext,
    tuning: UnitTuning,
}

impl UnitStateReplicator {
    pub fn new(authority: AuthorityContext, config: &MatchConfig) -> Self {
        Self {
            authority,
            tuning: UnitTuning::from_config(config),
        }
    }

    pub fn tuning(&self) -> &UnitTuning {
        &self.tuning
    }

    /// Builds the object backing `state` on this peer.
    pub fn behavior_for(&self, state: UnitState) -> Box<dyn Behavior> {
        let table = if self.authority.is_authority {
            &HOST_BEHAVIORS
        } else {
            &PEER_PLACEHOLDERS
        };
        table[state.index()]()
    }

    /// Creates a fresh, pending, idle unit.
    pub fn create_unit(&self, id: NetworkId, owner: NetworkId, position: [f32; 2]) -> UnitEntity {
        UnitEntity {
            id,
            owner: Replicated::new(owner, &self.authority),
            state: Replicated::new(UnitState::Idle, &self.authority),
            body: UnitBody {
                position: Replicated::new(position, &self.authority),
                waypoints: Vec::new(),
                pending: true,
                target_base: None,
            },
            behavior: self.behavior_for(UnitState::Idle),
            physics_ready: false,
            tint: None,
            ignore_collision_with: None,
        }
    }

    /// Host-only state change: exit the current behavior, write the
    /// discriminant, enter the new behavior.
    ///
    /// Returns whether the replicated discriminant changed. Entering the
    /// current state again restarts its behavior without a replicated write.
    pub fn change_state(
        &self,
        unit: &mut UnitEntity,
        next: UnitState,
        now: Duration,
    ) -> Result<bool, UnitError> {
        self.authority.ensure_authority("change unit state")?;

        if unit.is_dead() {
            tracing::warn!(
                "[unit] Refusing {:?} for unit {}: Dead is terminal",
                next,
                unit.id
            );
            return Err(UnitError::Terminal(unit.id));
        }

        let ctx = BehaviorContext {
            now,
            dt: Duration::ZERO,
            tuning: &self.tuning,
        };

        unit.behavior.exit(&mut unit.body, &ctx);
        let changed = unit.state.set(next)?;
        unit.behavior = self.behavior_for(next);
        unit.behavior.enter(&mut unit.body, &ctx);

        tracing::debug!("[unit] Unit {} -> {:?}", unit.id, next);
        Ok(changed)
    }

    /// Advances the host behavior of `unit` by one tick and applies any
    /// transition it asks for.
    pub fn tick_unit(
        &self,
        unit: &mut UnitEntity,
        now: Duration,
        dt: Duration,
    ) -> Result<TickReport, UnitError> {
        self.authority.ensure_authority("tick unit behavior")?;

        let ctx = BehaviorContext {
            now,
            dt,
            tuning: &self.tuning,
        };
        let outcome = unit.behavior.tick(&mut unit.body, &ctx);

        let strike = outcome.strike.map(|(base, damage)| Strike {
            unit: unit.id,
            base,
            damage,
        });
        if let Some(next) = outcome.next {
            self.change_state(unit, next, now)?;
        }

        Ok(TickReport {
            strike,
            despawn: outcome.despawn,
        })
    }

    /// Reacts to a replicated discriminant change.
    ///
    /// The host already ran the real behavior and gets `None`. Other peers
    /// swap in a placeholder for `change.next` and get the cue to play.
    pub fn on_state_replicated(
        &self,
        unit: &mut UnitEntity,
        change: &ValueChange<UnitState>,
    ) -> Option<VisualCue> {
        if self.authority.is_authority {
            return None;
        }
        unit.behavior = self.behavior_for(change.next);
        if change.next != UnitState::Idle {
            unit.body.pending = false;
        }
        tracing::debug!(
            "[unit] Unit {} mirrored {:?} -> {:?}",
            unit.id,
            change.previous,
            change.next
        );
        Some(unit.behavior.cue())
    }
}

/// Effects of one unit tick the session has to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub strike: Option<Strike>,
    pub despawn: bool,
}
