use std::sync::Arc;

use anyhow::Result;

use crate::config::SimulationConfig;
use crate::direction::Vector;
use crate::simulation::generator::SimpleFoodWorldGenerator;
use crate::simulation::world::World;

/// A running world together with the configuration that built it. Founds the
/// configured colonies with their starting stock and crew, and can rebuild
/// the whole world from scratch.
pub struct Simulation {
    world: Arc<World>,
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let world = Self::build_world(&config)?;
        Ok(Self { world, config })
    }

    fn build_world(config: &SimulationConfig) -> Result<Arc<World>> {
        let generator = SimpleFoodWorldGenerator::new(config.seed, config.world.clone());
        let world = Arc::new(World::new(
            Box::new(generator),
            config.world.clone(),
            config.seed,
        )?);

        // Colonies are spaced out along one axis.
        let mut acc = world.accessor();
        for i in 0..config.colonies {
            let position = Vector::new(i as i32 * config.colony_spacing, 0);
            let id = acc.create_colony(position, config.colony.clone(), config.ant.clone());
            let colony = world.colony(id);
            colony.increase_food(config.initial_colony_food);
            for _ in 0..config.ants_per_colony {
                colony.spawn_ant(
                    &mut acc,
                    config.ant_spawn_radius_min,
                    config.ant_spawn_radius_max,
                );
            }
        }
        drop(acc);
        Ok(world)
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn update(&self) {
        self.world.update();
    }

    /// Close the current world and build a fresh one from the stored
    /// configuration.
    pub fn reset(&mut self) -> Result<()> {
        self.world.close();
        self.world = Self::build_world(&self.config)?;
        Ok(())
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.world.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            colonies: 1,
            ants_per_colony: 3,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn setup_founds_the_configured_colonies() {
        let sim = Simulation::new(small_config()).unwrap();
        assert_eq!(sim.world().colonies().len(), 1);
        assert_eq!(sim.world().total_ants(), 3);
        assert_eq!(sim.world().total_colony_food(), 100.0);
    }

    #[test]
    fn reset_rebuilds_the_world_from_scratch() {
        let mut sim = Simulation::new(small_config()).unwrap();
        for _ in 0..3 {
            sim.update();
        }
        assert_eq!(sim.world().time(), 3);

        sim.reset().unwrap();
        assert_eq!(sim.world().time(), 0);
        assert_eq!(sim.world().total_ants(), 3);
    }
}
