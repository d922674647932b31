use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::BuildingCatalog;
use crate::resources::{Resource, ResourceStock};

pub type SettlementId = u32;

pub const DEFAULT_SATISFACTION: f64 = 50.0;
pub const DEFAULT_TAX_RATE: u8 = 5;
pub const MAX_TAX_RATE: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    Player,
    Neutral,
    Enemy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

fn default_satisfaction() -> f64 {
    DEFAULT_SATISFACTION
}

fn default_tax_rate() -> u8 {
    DEFAULT_TAX_RATE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub id: SettlementId,
    pub name: String,
    pub center: GeoPoint,
    pub population: u64,
    pub max_population: u64,
    pub owner: Owner,
    pub military: u64,
    pub buildings: Vec<String>,
    #[serde(default)]
    pub available_buildings: Vec<String>,
    #[serde(default)]
    pub building_limits: BTreeMap<String, u32>,
    #[serde(default = "default_satisfaction")]
    pub satisfaction: f64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: u8,
    #[serde(default)]
    pub protest_timer: Option<f64>,
    /// Fractional inhabitants carried over between ticks.
    #[serde(default)]
    pub population_fraction: f64,
    #[serde(default)]
    pub military_fraction: f64,
}

impl Settlement {
    pub fn new(id: SettlementId, name: impl Into<String>, owner: Owner, max_population: u64) -> Self {
        Self {
            id,
            name: name.into(),
            center: GeoPoint::default(),
            population: 0,
            max_population,
            owner,
            military: 0,
            buildings: Vec::new(),
            available_buildings: Vec::new(),
            building_limits: BTreeMap::new(),
            satisfaction: DEFAULT_SATISFACTION,
            tax_rate: DEFAULT_TAX_RATE,
            protest_timer: None,
            population_fraction: 0.0,
            military_fraction: 0.0,
        }
    }

    pub fn is_protesting(&self) -> bool {
        matches!(self.protest_timer, Some(timer) if timer > 0.0)
    }

    pub fn building_count(&self, building: &str) -> usize {
        self.buildings.iter().filter(|b| b.as_str() == building).count()
    }

    /// Fills `availableBuildings` and `buildingLimits` from the catalog.
    pub fn apply_catalog(&mut self, catalog: &BuildingCatalog) {
        self.available_buildings = catalog.ids().map(str::to_string).collect();
        self.building_limits = catalog.limits();
    }
}

/// Partial settlement write. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementUpdate {
    pub owner: Option<Owner>,
    pub population: Option<u64>,
    pub population_fraction: Option<f64>,
    pub military: Option<u64>,
    pub military_fraction: Option<f64>,
    pub satisfaction: Option<f64>,
    pub protest_timer: Option<Option<f64>>,
    pub tax_rate: Option<u8>,
}

impl SettlementUpdate {
    /// Everything the tick engine is allowed to change, taken from `next`.
    pub fn tick_fields(next: &Settlement) -> Self {
        Self {
            owner: Some(next.owner),
            population: Some(next.population),
            population_fraction: Some(next.population_fraction),
            military: Some(next.military),
            military_fraction: Some(next.military_fraction),
            satisfaction: Some(next.satisfaction),
            protest_timer: Some(next.protest_timer),
            tax_rate: None,
        }
    }

    fn apply(self, settlement: &mut Settlement) {
        if let Some(owner) = self.owner {
            settlement.owner = owner;
        }
        if let Some(population) = self.population {
            settlement.population = population.min(settlement.max_population);
        }
        if let Some(fraction) = self.population_fraction {
            settlement.population_fraction = fraction;
        }
        if let Some(military) = self.military {
            settlement.military = military;
        }
        if let Some(fraction) = self.military_fraction {
            settlement.military_fraction = fraction;
        }
        if let Some(satisfaction) = self.satisfaction {
            settlement.satisfaction = satisfaction.clamp(0.0, 100.0);
        }
        if let Some(timer) = self.protest_timer {
            settlement.protest_timer = timer;
        }
        if let Some(rate) = self.tax_rate {
            settlement.tax_rate = rate.min(MAX_TAX_RATE);
        }
    }
}

/// Player-wide aggregates persisted after each economic pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerTotals {
    pub population: u64,
    pub military: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum WorldError {
    #[error("settlement {0} not found")]
    SettlementNotFound(SettlementId),
    #[error("settlement {0} is not controlled by the player")]
    NotPlayerOwned(SettlementId),
    #[error("unknown building '{0}'")]
    UnknownBuilding(String),
    #[error("building '{building}' is not available in settlement {settlement}")]
    BuildingUnavailable {
        settlement: SettlementId,
        building: String,
    },
    #[error("settlement {settlement} already has the maximum of {limit} '{building}'")]
    BuildingLimitReached {
        settlement: SettlementId,
        building: String,
        limit: u32,
    },
    #[error("not enough {0} to build")]
    InsufficientResources(Resource),
    #[error("tax rate {0} is outside 0..=10")]
    InvalidTaxRate(u8),
}

/// Read/write surface the simulation uses. Persistence is up to the
/// implementation; the engine only ever goes through these methods.
pub trait WorldStore {
    /// Settlements ordered by ascending id.
    fn settlements(&self) -> Vec<Settlement>;
    fn update_settlement(
        &mut self,
        id: SettlementId,
        update: SettlementUpdate,
    ) -> Result<(), WorldError>;
    fn resource_pool(&self) -> ResourceStock;
    fn set_resource_pool(&mut self, pool: ResourceStock);
    fn player_totals(&self) -> PlayerTotals;
    fn set_player_totals(&mut self, totals: PlayerTotals);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub scenario: String,
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub totals: PlayerTotals,
    pub resource_pool: ResourceStock,
    pub settlements: Vec<Settlement>,
}

/// In-memory world state.
#[derive(Debug, Clone, Default)]
pub struct World {
    tick: u64,
    elapsed_seconds: f64,
    settlements: BTreeMap<SettlementId, Settlement>,
    resource_pool: ResourceStock,
    totals: PlayerTotals,
}

impl World {
    pub fn new(resource_pool: ResourceStock) -> Self {
        Self {
            resource_pool,
            ..Self::default()
        }
    }

    /// Rebuilds a world from a persisted snapshot.
    pub fn restore(snapshot: WorldSnapshot) -> Self {
        let mut resource_pool = snapshot.resource_pool;
        resource_pool.clamp_non_negative();
        Self {
            tick: snapshot.tick,
            elapsed_seconds: snapshot.elapsed_seconds,
            settlements: snapshot
                .settlements
                .into_iter()
                .map(|s| (s.id, s))
                .collect(),
            resource_pool,
            totals: snapshot.totals,
        }
    }

    /// Adds or replaces a settlement.
    pub fn insert_settlement(&mut self, settlement: Settlement) {
        self.settlements.insert(settlement.id, settlement);
    }

    pub fn settlement(&self, id: SettlementId) -> Option<&Settlement> {
        self.settlements.get(&id)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn advance_time(&mut self, elapsed_seconds: f64) {
        self.tick += 1;
        self.elapsed_seconds += elapsed_seconds;
    }

    pub fn total_population(&self) -> u64 {
        self.settlements
            .values()
            .filter(|s| s.owner == Owner::Player)
            .map(|s| s.population)
            .sum()
    }

    pub fn set_tax_rate(&mut self, id: SettlementId, rate: u8) -> Result<(), WorldError> {
        if rate > MAX_TAX_RATE {
            return Err(WorldError::InvalidTaxRate(rate));
        }
        let settlement = self
            .settlements
            .get_mut(&id)
            .ok_or(WorldError::SettlementNotFound(id))?;
        if settlement.owner != Owner::Player {
            return Err(WorldError::NotPlayerOwned(id));
        }
        settlement.tax_rate = rate;
        Ok(())
    }

    /// Builds one instance of `building`, paying its cost from the pool.
    pub fn construct(
        &mut self,
        id: SettlementId,
        building: &str,
        catalog: &BuildingCatalog,
    ) -> Result<(), WorldError> {
        let definition = catalog
            .get(building)
            .ok_or_else(|| WorldError::UnknownBuilding(building.to_string()))?;
        let settlement = self
            .settlements
            .get_mut(&id)
            .ok_or(WorldError::SettlementNotFound(id))?;
        if settlement.owner != Owner::Player {
            return Err(WorldError::NotPlayerOwned(id));
        }
        if !settlement.available_buildings.iter().any(|b| b == building) {
            return Err(WorldError::BuildingUnavailable {
                settlement: id,
                building: building.to_string(),
            });
        }
        let limit = settlement
            .building_limits
            .get(building)
            .copied()
            .unwrap_or(definition.max_count);
        if settlement.building_count(building) >= limit as usize {
            return Err(WorldError::BuildingLimitReached {
                settlement: id,
                building: building.to_string(),
                limit,
            });
        }
        if let Some((missing, _)) = definition
            .cost
            .iter()
            .find(|(kind, amount)| self.resource_pool[*kind] < *amount)
        {
            return Err(WorldError::InsufficientResources(missing));
        }
        self.resource_pool.subtract_scaled(&definition.cost, 1.0);
        settlement.buildings.push(building.to_string());
        Ok(())
    }

    pub fn snapshot(&self, scenario: &str) -> WorldSnapshot {
        WorldSnapshot {
            scenario: scenario.to_string(),
            tick: self.tick,
            elapsed_seconds: self.elapsed_seconds,
            totals: self.totals,
            resource_pool: self.resource_pool,
            settlements: self.settlements.values().cloned().collect(),
        }
    }
}

impl WorldStore for World {
    fn settlements(&self) -> Vec<Settlement> {
        self.settlements.values().cloned().collect()
    }

    fn update_settlement(
        &mut self,
        id: SettlementId,
        update: SettlementUpdate,
    ) -> Result<(), WorldError> {
        let settlement = self
            .settlements
            .get_mut(&id)
            .ok_or(WorldError::SettlementNotFound(id))?;
        update.apply(settlement);
        Ok(())
    }

    fn resource_pool(&self) -> ResourceStock {
        self.resource_pool
    }

    fn set_resource_pool(&mut self, mut pool: ResourceStock) {
        pool.clamp_non_negative();
        self.resource_pool = pool;
    }

    fn player_totals(&self) -> PlayerTotals {
        self.totals
    }

    fn set_player_totals(&mut self, totals: PlayerTotals) {
        self.totals = totals;
    }
}
