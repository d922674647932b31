use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    catalog::BuildingCatalog,
    resources::ResourceStock,
    systems::OpponentSettings,
    world::{
        GeoPoint, Owner, Settlement, SettlementId, World, DEFAULT_SATISFACTION, DEFAULT_TAX_RATE,
        MAX_TAX_RATE,
    },
};

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_snapshot_interval_ticks() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_owner() -> Owner {
    Owner::Neutral
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    /// Wall-clock period between server ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub opponent: OpponentSettings,
    /// Building catalog file, relative to the scenario. The built-in catalog
    /// is used when omitted.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub resources: ResourceStock,
    pub settlements: Vec<ScenarioSettlement>,
    #[serde(skip)]
    source_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSettlement {
    pub id: SettlementId,
    pub name: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub population: u64,
    pub max_population: u64,
    #[serde(default = "default_owner")]
    pub owner: Owner,
    #[serde(default)]
    pub military: u64,
    #[serde(default)]
    pub buildings: Vec<String>,
    #[serde(default)]
    pub satisfaction: Option<f64>,
    #[serde(default)]
    pub tax_rate: Option<u8>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("settlement id {0} is used more than once")]
    DuplicateSettlement(SettlementId),
    #[error("settlement {id} starts with {population} inhabitants but houses at most {max}")]
    Overpopulated {
        id: SettlementId,
        population: u64,
        max: u64,
    },
    #[error("settlement {id} has tax rate {rate}, above the maximum of 10")]
    TaxRateTooHigh { id: SettlementId, rate: u8 },
    #[error("settlement {id} starts with unknown building '{building}'")]
    UnknownBuilding { id: SettlementId, building: String },
    #[error("settlement {id} has satisfaction {value}, expected 0..=100")]
    SatisfactionOutOfRange { id: SettlementId, value: f64 },
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let mut scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario.source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());
        Ok(scenario)
    }
}

impl Scenario {
    pub fn from_yaml_str(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).context("Failed to parse scenario")
    }

    pub fn load_catalog(&self) -> Result<BuildingCatalog> {
        match &self.catalog {
            Some(file) => BuildingCatalog::load(self.source_dir.join(file)),
            None => Ok(BuildingCatalog::standard()),
        }
    }

    /// Validates the settlements against `catalog` and builds the starting
    /// world.
    pub fn build_world(&self, catalog: &BuildingCatalog) -> Result<World> {
        let mut world = World::new(self.resources);
        let mut seen = HashSet::new();
        for entry in &self.settlements {
            let id = entry.id;
            if !seen.insert(id) {
                return Err(ScenarioError::DuplicateSettlement(id).into());
            }
            if entry.population > entry.max_population {
                return Err(ScenarioError::Overpopulated {
                    id,
                    population: entry.population,
                    max: entry.max_population,
                }
                .into());
            }
            let tax_rate = entry.tax_rate.unwrap_or(DEFAULT_TAX_RATE);
            if tax_rate > MAX_TAX_RATE {
                return Err(ScenarioError::TaxRateTooHigh { id, rate: tax_rate }.into());
            }
            let satisfaction = entry.satisfaction.unwrap_or(DEFAULT_SATISFACTION);
            if !(0.0..=100.0).contains(&satisfaction) {
                return Err(ScenarioError::SatisfactionOutOfRange {
                    id,
                    value: satisfaction,
                }
                .into());
            }
            if let Some(unknown) = entry.buildings.iter().find(|b| catalog.get(b).is_none()) {
                return Err(ScenarioError::UnknownBuilding {
                    id,
                    building: unknown.clone(),
                }
                .into());
            }

            let mut settlement =
                Settlement::new(id, entry.name.clone(), entry.owner, entry.max_population);
            settlement.center = GeoPoint {
                lat: entry.lat,
                lon: entry.lon,
            };
            settlement.population = entry.population;
            settlement.military = entry.military;
            settlement.buildings = entry.buildings.clone();
            settlement.satisfaction = satisfaction;
            settlement.tax_rate = tax_rate;
            settlement.apply_catalog(catalog);
            world.insert_settlement(settlement);
        }
        Ok(world)
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or(120)
    }

    /// Fixed simulated seconds per tick for headless runs.
    pub fn tick_seconds(&self) -> f64 {
        self.tick_interval_ms as f64 / 1_000.0
    }
}
