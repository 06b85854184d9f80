use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// World-level tunables: scent decay rates, the day/night clock and food expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldParameters {
    pub food_scent_decay: f32,
    pub colony_scent_decay: f32,
    pub avoid_scent_decay: f32,
    /// Length of a full day/night cycle in ticks.
    pub day_night_cycle_time: u64,
    /// Fraction of the cycle that counts as day.
    pub day_percentage: f32,
    pub food_expire_time_mean: f32,
    pub food_expire_time_deviation: f32,
    pub food_expire_time_min: f32,
}

impl Default for WorldParameters {
    fn default() -> Self {
        Self {
            food_scent_decay: 0.995,
            colony_scent_decay: 0.9975,
            avoid_scent_decay: 0.85,
            day_night_cycle_time: 2000,
            day_percentage: 0.6,
            food_expire_time_mean: 1200.0,
            food_expire_time_deviation: 1000.0,
            food_expire_time_min: 1000.0,
        }
    }
}

/// Colony-level tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyParameters {
    /// Stock the colony must hold beyond the spawn cost before it breeds.
    pub ant_spawn_food_threshold: f32,
    pub ant_spawn_food_cost: f32,
    /// Number of cells claimed by random walk when the colony is founded.
    pub spread_cells: u32,
}

impl Default for ColonyParameters {
    fn default() -> Self {
        Self {
            ant_spawn_food_threshold: 75.0,
            ant_spawn_food_cost: 25.0,
            spread_cells: 400,
        }
    }
}

/// Per-ant tunables: load, scent reservoirs and the energy budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntParameters {
    pub carrying_capacity: f32,
    /// Preference for keeping the current heading when choosing the next cell.
    pub straight_bias: f32,
    pub colony_scent_gain: f32,
    pub colony_scent_addend: f32,
    pub colony_scent_emission_decay: f32,
    pub food_scent_gain: f32,
    pub food_scent_addend: f32,
    pub food_scent_emission_decay: f32,
    pub avoid_scent_added: f32,
    pub avoid_scent_factor: f32,
    /// Energy an ant holds when fully fed; one unit is spent per step.
    pub energy_gain: i32,
    /// Energy restored per unit of food consumed.
    pub energy_food_factor: f32,
    pub path_partition_size: usize,
    pub path_levels: usize,
    pub behavior: BehaviorParameters,
}

impl Default for AntParameters {
    fn default() -> Self {
        Self {
            carrying_capacity: 1.0,
            straight_bias: 1.0,
            colony_scent_gain: 5.0,
            colony_scent_addend: 2.0,
            colony_scent_emission_decay: 0.9925,
            food_scent_gain: 2.0,
            food_scent_addend: 2.0,
            food_scent_emission_decay: 0.99,
            avoid_scent_added: 0.5,
            avoid_scent_factor: 2.5,
            energy_gain: 4000,
            energy_food_factor: 2000.0 / 3.0,
            path_partition_size: 80,
            path_levels: 7,
            behavior: BehaviorParameters::default(),
        }
    }
}

/// Weights of the direction-choice model shared by all behavior states.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorParameters {
    /// Scent level treated as a strong trail.
    pub high_scent_threshold: f32,
    /// Ticks of weak food scent tolerated before giving up on a trail.
    pub bad_scent_follow_time: u64,
    /// Steps without colony scent before a homing ant counts as lost.
    pub lost_scent_steps: u32,
    pub weight_pursue: f32,
    pub weight_avoid: f32,
    pub bias_mix: f32,
    pub weight_score: f32,
    pub weight_random: f32,
    pub arg_random: f32,
    pub weight_straight: f32,
    pub bias_choose: f32,
    pub weight_height: f32,
    pub explore_init_steps_mean: f32,
    pub explore_init_steps_deviation: f32,
}

impl Default for BehaviorParameters {
    fn default() -> Self {
        Self {
            high_scent_threshold: 1.0,
            bad_scent_follow_time: 50,
            lost_scent_steps: 50,
            weight_pursue: 2.0,
            weight_avoid: -0.5,
            bias_mix: 0.0,
            weight_score: 5.0,
            weight_random: 0.5,
            arg_random: 7.0,
            weight_straight: 0.5,
            bias_choose: 0.0,
            weight_height: 20.0,
            explore_init_steps_mean: 20.0,
            explore_init_steps_deviation: 50.0,
        }
    }
}

/// Top-level run configuration, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub colonies: u32,
    /// Cell distance between consecutive colony centers on the x axis.
    pub colony_spacing: i32,
    pub ants_per_colony: u32,
    pub initial_colony_food: f32,
    pub ant_spawn_radius_min: i32,
    pub ant_spawn_radius_max: i32,
    pub world: WorldParameters,
    pub colony: ColonyParameters,
    pub ant: AntParameters,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            colonies: 2,
            colony_spacing: 100,
            ants_per_colony: 50,
            initial_colony_food: 100.0,
            ant_spawn_radius_min: 5,
            ant_spawn_radius_max: 5,
            world: WorldParameters::default(),
            colony: ColonyParameters::default(),
            ant: AntParameters::default(),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: SimulationConfig = toml::from_str("").unwrap();
        assert_eq!(config.seed, 1337);
        assert_eq!(config.world.day_night_cycle_time, 2000);
        assert_eq!(config.colony.ant_spawn_food_cost, 25.0);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: SimulationConfig = toml::from_str(
            "seed = 7\n\n[world]\nday_percentage = 1.0\n\n[ant.behavior]\nweight_pursue = 3.0\n",
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.world.day_percentage, 1.0);
        assert_eq!(config.ant.behavior.weight_pursue, 3.0);
        // Untouched siblings keep their defaults.
        assert_eq!(config.world.food_scent_decay, 0.995);
        assert_eq!(config.ant.behavior.weight_avoid, -0.5);
    }
}
