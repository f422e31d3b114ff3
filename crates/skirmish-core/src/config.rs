//! Match configuration.
//!
//! Every field has a default, so a JSON file only needs to list what it
//! changes. Durations are written in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::world::{Color, TeamId};

/// A place where a player's base stands, with the identity handed to the
/// connection that ends up in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnSlot {
    pub position: [f32; 2],
    pub color: Color,
    pub team: TeamId,
}

impl SpawnSlot {
    pub fn new(position: [f32; 2], color: Color, team: TeamId) -> Self {
        Self {
            position,
            color,
            team,
        }
    }
}

/// Tuning and timing for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Players required before a roster reset hands over to Playing.
    pub min_players: usize,
    #[serde(with = "duration_ms")]
    pub countdown: Duration,
    #[serde(with = "duration_ms")]
    pub roster_poll_interval: Duration,
    #[serde(with = "duration_ms")]
    pub roster_timeout: Duration,
    /// Delay between a despawn request and the entity leaving the roster root.
    #[serde(with = "duration_ms")]
    pub despawn_latency: Duration,
    /// Unit movement speed in world units per second.
    pub unit_speed: f32,
    pub unit_damage: u32,
    #[serde(with = "duration_ms")]
    pub attack_interval: Duration,
    pub attack_hits: u32,
    pub base_health: u32,
    #[serde(with = "duration_ms")]
    pub production_interval: Duration,
    pub max_units_per_player: usize,
    /// How long a dead unit stays in the world before it is removed.
    #[serde(with = "duration_ms")]
    pub corpse_linger: Duration,
    /// Distance at which two units touch.
    pub contact_radius: f32,
    /// Distance at which a unit touches a base.
    pub base_radius: f32,
    pub spawn_slots: Vec<SpawnSlot>,
    pub seed: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            min_players: 2,
            countdown: Duration::from_secs(3),
            roster_poll_interval: Duration::from_millis(100),
            roster_timeout: Duration::from_secs(5),
            despawn_latency: Duration::ZERO,
            unit_speed: 120.0,
            unit_damage: 10,
            attack_interval: Duration::from_millis(500),
            attack_hits: 3,
            base_health: 100,
            production_interval: Duration::from_secs(4),
            max_units_per_player: 5,
            corpse_linger: Duration::from_secs(1),
            contact_radius: 20.0,
            base_radius: 40.0,
            spawn_slots: vec![
                SpawnSlot::new([-400.0, 0.0], Color::RED, 0),
                SpawnSlot::new([400.0, 0.0], Color::BLUE, 1),
                SpawnSlot::new([0.0, -400.0], Color::GREEN, 2),
                SpawnSlot::new([0.0, 400.0], Color::YELLOW, 3),
            ],
            seed: 12345,
        }
    }
}

impl MatchConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Checks the invariants the rest of the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.spawn_slots.is_empty() {
            return Err(ConfigError::NoSpawnSlots);
        }
        if self.min_players > self.spawn_slots.len() {
            return Err(ConfigError::MinPlayersExceedSlots {
                min_players: self.min_players,
                slots: self.spawn_slots.len(),
            });
        }
        for (field, value) in [
            ("roster_poll_interval", self.roster_poll_interval),
            ("roster_timeout", self.roster_timeout),
            ("attack_interval", self.attack_interval),
            ("production_interval", self.production_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        Ok(())
    }

    /// Length of one simulation tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_possible_truncation)]
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
