use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bastion::{
    engine::EngineSettings,
    scenario::ScenarioLoader,
    snapshot::load_snapshot,
    systems::build_engine,
    web::{self, WebServerConfig},
    world::World,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Settlement economy simulation server")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/frontier.yaml")]
    scenario: PathBuf,

    /// Override tick count for headless runs (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override snapshot interval in ticks (0 disables snapshots)
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Resume from a snapshot file instead of the scenario's starting state
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Serve the world over HTTP and tick in real time
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&scenario.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let catalog = Arc::new(scenario.load_catalog()?);
    let world = match &cli.resume {
        Some(path) => {
            let snapshot = load_snapshot(path)?;
            info!(tick = snapshot.world.tick, path = %path.display(), "resuming from snapshot");
            World::restore(snapshot.world)
        }
        None => scenario.build_world(&catalog)?,
    };
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_ticks);
    let snapshot_dir = cli
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from("snapshots"));

    if cli.serve {
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(web::run(WebServerConfig {
            scenario,
            world,
            catalog,
            snapshot_interval,
            snapshot_dir,
            host: cli.host,
            port: cli.port,
        }));
    }

    let ticks = scenario.ticks(cli.ticks);
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        snapshot_interval_ticks: snapshot_interval,
        snapshot_dir,
        catalog,
    };
    let mut engine = build_engine(settings, scenario.opponent);
    let mut world = world;

    info!(scenario = %scenario.name, ticks, "starting headless run");
    let stats = engine.run_with_hook(
        &mut world,
        ticks,
        scenario.tick_seconds(),
        |summary, world| {
            if summary.tick % 10 == 0 {
                info!(
                    tick = summary.tick,
                    population = world.total_population(),
                    "progress"
                );
            }
        },
    );

    println!(
        "Scenario '{}' finished {} ticks ({} failed). Player population: {}",
        scenario.name,
        stats.completed,
        stats.failed,
        world.total_population()
    );
    Ok(())
}
