use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use formicarium::config::SimulationConfig;
use formicarium::simulation::Simulation;

/// Command-line arguments for the simulation runner.
#[derive(Parser)]
#[command(name = "formicarium", version, about = "Ant colony simulation")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate.
    #[arg(short, long, default_value_t = 10_000)]
    ticks: u64,

    /// Overrides the seed from the configuration.
    #[arg(short, long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let sim = Simulation::new(config)?;
    info!(
        seed = sim.config().seed,
        colonies = sim.config().colonies,
        ants = sim.world().total_ants(),
        "simulation ready"
    );

    for tick in 1..=cli.ticks {
        sim.update();
        if tick % 1000 == 0 {
            info!(
                tick,
                ants = sim.world().total_ants(),
                food = sim.world().total_colony_food(),
                unsafe_proceeds = sim.world().unsafe_proceeds(),
                "progress"
            );
        }
    }

    info!(
        ticks = cli.ticks,
        ants = sim.world().total_ants(),
        food = sim.world().total_colony_food(),
        unsafe_proceeds = sim.world().unsafe_proceeds(),
        "simulation finished"
    );
    Ok(())
}
