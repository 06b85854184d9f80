use formicarium::config::{AntParameters, ColonyParameters, SimulationConfig, WorldParameters};
use formicarium::direction::Vector;
use formicarium::simulation::cell::Cell;
use formicarium::simulation::chunk::Chunk;
use formicarium::simulation::generator::{FoodDrop, WorldGenerator};
use formicarium::simulation::{Simulation, World};

/// Flat, foodless terrain so tests control every food pile themselves.
struct BarrenGenerator;

impl WorldGenerator for BarrenGenerator {
    fn set_seed(&mut self, _seed: u64) {}

    fn generate(&mut self, cell: &mut Cell) -> Option<f32> {
        cell.height = 0.5;
        None
    }

    fn scatter_food(&mut self, center: Vector, amount: f32) -> Vec<FoodDrop> {
        vec![FoodDrop {
            position: center,
            amount,
            expire_timer: 100_000,
        }]
    }

    fn update(&mut self, _chunk: &Chunk, _time: u64) -> Vec<FoodDrop> {
        Vec::new()
    }
}

/// Colony parameters that rule out breeding, so ant and food counts only
/// change through foraging and starvation.
fn sterile_colony() -> ColonyParameters {
    ColonyParameters {
        ant_spawn_food_threshold: 1e12,
        ..ColonyParameters::default()
    }
}

#[test]
fn foragers_bring_food_home() {
    let world = World::new(Box::new(BarrenGenerator), WorldParameters::default(), 99)
        .expect("world construction failed");

    // A huge energy-per-food factor makes resting at home virtually free,
    // so the stock only reflects what foragers carried in.
    let ants = AntParameters {
        energy_food_factor: 1e9,
        ..AntParameters::default()
    };
    let mut acc = world.accessor();
    let id = acc.create_colony(Vector::ZERO, sterile_colony(), ants);
    let colony = world.colony(id);

    // Blanket the colony ground with food; any wandering ant trips over a
    // pile and can deposit the moment it stands on home ground again.
    for x in -4..=4 {
        for y in -4..=4 {
            if (x, y) != (0, 0) {
                acc.add_food(Vector::new(x, y), 5.0, 100_000);
            }
        }
    }
    for _ in 0..30 {
        colony.spawn_ant(&mut acc, 1, 2);
    }
    drop(acc);

    assert_eq!(colony.food(), 0.0);
    for _ in 0..400 {
        world.update();
    }
    world.close();

    assert!(
        colony.food() > 0.0,
        "no forager deposited anything in 400 ticks"
    );
    assert_eq!(world.total_ants(), 30, "ants starved unexpectedly");
}

#[test]
fn a_barren_world_stays_barren() {
    let world = World::new(Box::new(BarrenGenerator), WorldParameters::default(), 7)
        .expect("world construction failed");

    let mut acc = world.accessor();
    let id = acc.create_colony(Vector::ZERO, sterile_colony(), AntParameters::default());
    let colony = world.colony(id);
    for _ in 0..10 {
        colony.spawn_ant(&mut acc, 2, 4);
    }
    drop(acc);

    for _ in 0..200 {
        world.update();
    }
    world.close();

    assert_eq!(world.total_colony_food(), 0.0);
    assert_eq!(world.total_ants(), 10);
}

#[test]
fn the_default_setup_runs_for_a_while() {
    let config = SimulationConfig::default();
    let expected = (config.colonies * config.ants_per_colony) as usize;
    let sim = Simulation::new(config).expect("simulation setup failed");
    assert_eq!(sim.world().total_ants(), expected);

    for _ in 0..50 {
        sim.update();
    }

    assert_eq!(sim.world().time(), 50);
    assert!(sim.world().total_ants() > 0);
}
