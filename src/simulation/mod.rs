pub mod ant;
pub mod behavior;
pub mod cell;
pub mod chunk;
pub mod chunk_map;
pub mod entity;
pub mod generator;
pub mod path_history;
pub mod sim;
pub mod sync;
pub mod world;

use rand::Rng;
use thiserror::Error;

pub use entity::{AntRef, Colony, ColonyId};
pub use generator::{SimpleFoodWorldGenerator, WorldGenerator};
pub use sim::Simulation;
pub use world::World;

/// Scent strengths below this are treated as no scent at all.
pub const NO_SCENT_THRESHOLD: f32 = 0.001;
/// Terrain above this height cannot be walked on.
pub const MAX_WALKABLE_HEIGHT: f32 = 0.62;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("colony cannot cover {requested} food, only {available} in stock")]
    InsufficientFood { requested: f32, available: f32 },
}

/// Sample from a normal distribution via the Box-Muller transform.
pub fn gaussian<R: Rng>(rng: &mut R, mean: f32, deviation: f32) -> f32 {
    let u1 = rng.random::<f32>().clamp(f32::MIN_POSITIVE, 1.0);
    let u2 = rng.random::<f32>();
    let magnitude = (-2.0 * u1.ln()).sqrt();
    mean + deviation * magnitude * (std::f32::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn gaussian_matches_requested_moments() {
        let mut rng = SmallRng::seed_from_u64(7);
        let samples: Vec<f32> = (0..20_000).map(|_| gaussian(&mut rng, 5.0, 2.0)).collect();
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let variance =
            samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / samples.len() as f32;
        assert!((mean - 5.0).abs() < 0.1, "mean {mean}");
        assert!((variance.sqrt() - 2.0).abs() < 0.1, "deviation {}", variance.sqrt());
    }
}
