pub mod config;
pub mod direction;
pub mod simulation;

pub use config::SimulationConfig;
pub use direction::{Direction, Vector};
pub use simulation::{SimpleFoodWorldGenerator, Simulation, World, WorldGenerator};
