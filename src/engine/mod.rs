use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    catalog::BuildingCatalog,
    rng::{RngManager, SystemRng},
    snapshot::SnapshotWriter,
    world::{World, WorldStore},
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub snapshot_interval_ticks: u64,
    pub snapshot_dir: PathBuf,
    pub catalog: Arc<BuildingCatalog>,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            systems: self.systems,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_ticks,
            ),
            settings: self.settings,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("elapsed time must be finite and non-negative, got {0}")]
    InvalidElapsed(f64),
}

#[derive(Clone, Debug)]
pub struct SystemRunReport {
    pub name: String,
    pub duration_ms: f64,
}

#[derive(Clone, Debug)]
pub struct TickSummary {
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub system_reports: Vec<SystemRunReport>,
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed: u64,
    pub failed: u64,
}

pub struct Engine {
    rng: RngManager,
    systems: Vec<Box<dyn System>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    pub fn catalog(&self) -> &BuildingCatalog {
        &self.settings.catalog
    }

    /// Runs every system once, in registration order, then advances the
    /// world clock. A failing system aborts the rest of the tick; whatever it
    /// and earlier systems already wrote stays in the world.
    pub fn tick(&mut self, world: &mut World, elapsed_seconds: f64) -> Result<TickSummary> {
        if !elapsed_seconds.is_finite() || elapsed_seconds < 0.0 {
            return Err(EngineError::InvalidElapsed(elapsed_seconds).into());
        }
        let tick = world.tick() + 1;
        let mut system_reports = Vec::with_capacity(self.systems.len());
        for system in &mut self.systems {
            let mut rng_stream = self.rng.stream(system.name());
            let ctx = SystemContext {
                tick,
                elapsed_seconds,
                scenario_name: &self.settings.scenario_name,
                catalog: &self.settings.catalog,
            };
            let start = Instant::now();
            system
                .run(&ctx, &mut *world, &mut rng_stream)
                .with_context(|| format!("system '{}' failed on tick {tick}", system.name()))?;
            system_reports.push(SystemRunReport {
                name: system.name().to_string(),
                duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
            });
        }
        world.advance_time(elapsed_seconds);
        let snapshot_path = self
            .snapshot_writer
            .maybe_write(world, &self.settings.scenario_name)?;
        if let Some(path) = &snapshot_path {
            info!(tick, path = %path.display(), "wrote world snapshot");
        }
        debug!(tick, elapsed_seconds, systems = system_reports.len(), "tick complete");
        Ok(TickSummary {
            tick,
            elapsed_seconds,
            system_reports,
            snapshot_path,
        })
    }

    pub fn run(&mut self, world: &mut World, ticks: u64, elapsed_seconds: f64) -> RunStats {
        self.run_with_hook(world, ticks, elapsed_seconds, |_, _| {})
    }

    /// Runs `ticks` ticks of `elapsed_seconds` each. Failed ticks are logged
    /// and skipped; the hook only sees completed ones.
    pub fn run_with_hook<F>(
        &mut self,
        world: &mut World,
        ticks: u64,
        elapsed_seconds: f64,
        mut hook: F,
    ) -> RunStats
    where
        F: FnMut(&TickSummary, &World),
    {
        let mut stats = RunStats::default();
        for _ in 0..ticks {
            match self.tick(world, elapsed_seconds) {
                Ok(summary) => {
                    stats.completed += 1;
                    hook(&summary, world);
                }
                Err(err) => {
                    stats.failed += 1;
                    error!("tick failed, skipping: {err:#}");
                }
            }
        }
        stats
    }
}

pub struct SystemContext<'a> {
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub scenario_name: &'a str,
    pub catalog: &'a BuildingCatalog,
}

pub trait System: Send {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut dyn WorldStore,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}
