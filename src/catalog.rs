use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::{Resource, ResourceStock};

/// A single resource flow, e.g. `{ type: food, amount: 10 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRate {
    #[serde(rename = "type")]
    pub kind: Resource,
    pub amount: f64,
}

/// Consumption as it appears in catalog files: either one flow or several.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResourceEffect {
    Single(ResourceRate),
    Multi(BTreeMap<Resource, f64>),
}

impl ResourceEffect {
    pub fn normalize(&self) -> ResourceStock {
        match self {
            ResourceEffect::Single(rate) => [(rate.kind, rate.amount)].into_iter().collect(),
            ResourceEffect::Multi(map) => map.iter().map(|(kind, amount)| (*kind, *amount)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationEffect {
    pub housing: u64,
    #[serde(alias = "growth_per_second")]
    pub growth_per_second: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilitaryEffect {
    #[serde(alias = "production_per_second")]
    pub production_per_second: f64,
    #[serde(alias = "population_use_per_unit")]
    pub population_use_per_unit: f64,
}

/// Immutable catalog entry. Consumption is already normalized into a
/// [`ResourceStock`] of per-second amounts; an empty stock means none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingDefinition {
    pub id: String,
    pub name: String,
    pub cost: ResourceStock,
    pub production: Option<ResourceRate>,
    pub consumption: ResourceStock,
    pub population: Option<PopulationEffect>,
    pub military: Option<MilitaryEffect>,
    pub workers: u32,
    pub satisfaction_bonus: f64,
    pub max_count: u32,
}

impl BuildingDefinition {
    pub fn consumes(&self) -> bool {
        !self.consumption.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawBuilding {
    id: String,
    name: String,
    #[serde(default)]
    cost: BTreeMap<Resource, f64>,
    #[serde(default)]
    production: Option<ResourceRate>,
    #[serde(default)]
    consumption: Option<ResourceEffect>,
    #[serde(default)]
    population: Option<PopulationEffect>,
    #[serde(default)]
    military: Option<MilitaryEffect>,
    #[serde(default)]
    workers: u32,
    #[serde(default)]
    satisfaction_bonus: f64,
    max_count: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("building '{0}' is defined more than once")]
    Duplicate(String),
    #[error("building '{building}' has an invalid {field}")]
    InvalidAmount {
        building: String,
        field: &'static str,
    },
}

impl TryFrom<RawBuilding> for BuildingDefinition {
    type Error = CatalogError;

    fn try_from(raw: RawBuilding) -> Result<Self, CatalogError> {
        let invalid = |field| CatalogError::InvalidAmount {
            building: raw.id.clone(),
            field,
        };
        let non_negative = |value: f64| value.is_finite() && value >= 0.0;

        if !raw.cost.values().all(|v| non_negative(*v)) {
            return Err(invalid("cost"));
        }
        if let Some(rate) = raw.production {
            if !non_negative(rate.amount) {
                return Err(invalid("production"));
            }
        }
        let consumption = raw
            .consumption
            .as_ref()
            .map(ResourceEffect::normalize)
            .unwrap_or_default();
        if !consumption.iter().all(|(_, v)| non_negative(v)) {
            return Err(invalid("consumption"));
        }
        if let Some(pop) = raw.population {
            if !non_negative(pop.growth_per_second) {
                return Err(invalid("population growth"));
            }
        }
        if let Some(mil) = raw.military {
            if !non_negative(mil.production_per_second) || !non_negative(mil.population_use_per_unit)
            {
                return Err(invalid("military effect"));
            }
        }
        if !raw.satisfaction_bonus.is_finite() {
            return Err(invalid("satisfaction bonus"));
        }

        Ok(BuildingDefinition {
            cost: raw.cost.iter().map(|(k, v)| (*k, *v)).collect(),
            consumption,
            id: raw.id,
            name: raw.name,
            production: raw.production,
            population: raw.population,
            military: raw.military,
            workers: raw.workers,
            satisfaction_bonus: raw.satisfaction_bonus,
            max_count: raw.max_count,
        })
    }
}

/// Ordered, read-only set of building definitions.
#[derive(Debug, Clone, Default)]
pub struct BuildingCatalog {
    buildings: Vec<BuildingDefinition>,
    index: HashMap<String, usize>,
}

impl BuildingCatalog {
    pub fn new(buildings: Vec<BuildingDefinition>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(buildings.len());
        for (position, building) in buildings.iter().enumerate() {
            if index.insert(building.id.clone(), position).is_some() {
                return Err(CatalogError::Duplicate(building.id.clone()));
            }
        }
        Ok(Self { buildings, index })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: Vec<RawBuilding> =
            serde_yaml::from_str(text).context("Failed to parse building catalog")?;
        let buildings = raw
            .into_iter()
            .map(BuildingDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(buildings)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    /// The catalog shipped with the server.
    pub fn standard() -> Self {
        Self::from_yaml_str(STANDARD_CATALOG).unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&BuildingDefinition> {
        self.index.get(id).map(|position| &self.buildings[*position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildingDefinition> {
        self.buildings.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.buildings.iter().map(|b| b.id.as_str())
    }

    pub fn limits(&self) -> BTreeMap<String, u32> {
        self.buildings
            .iter()
            .map(|b| (b.id.clone(), b.max_count))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }
}

const STANDARD_CATALOG: &str = r#"
- id: farm
  name: Farm
  cost: { gold: 50, wood: 20 }
  production: { type: food, amount: 6 }
  workers: 10
  max_count: 6
- id: lumber_mill
  name: Lumber Mill
  cost: { gold: 40 }
  production: { type: wood, amount: 3 }
  workers: 10
  max_count: 4
- id: oil_well
  name: Oil Well
  cost: { gold: 120, wood: 40 }
  production: { type: oil, amount: 2 }
  workers: 15
  max_count: 3
- id: mine
  name: Mine
  cost: { gold: 100, wood: 60 }
  production: { type: metal, amount: 2 }
  workers: 15
  max_count: 3
- id: steel_mill
  name: Steel Mill
  cost: { gold: 200, wood: 50, metal: 40 }
  production: { type: steel, amount: 1 }
  consumption: { metal: 2, oil: 1 }
  workers: 20
  max_count: 2
- id: arms_factory
  name: Arms Factory
  cost: { gold: 250, steel: 30 }
  production: { type: weapons, amount: 1 }
  consumption: { type: steel, amount: 1 }
  workers: 20
  max_count: 2
- id: market
  name: Market
  cost: { gold: 80, wood: 30 }
  production: { type: gold, amount: 2 }
  workers: 5
  satisfaction_bonus: 2
  max_count: 2
- id: housing
  name: Housing Block
  cost: { gold: 60, wood: 40 }
  population: { housing: 100, growth_per_second: 0.5 }
  max_count: 5
- id: barracks
  name: Barracks
  cost: { gold: 150, wood: 50, metal: 20 }
  military: { production_per_second: 0.2, population_use_per_unit: 1 }
  workers: 5
  max_count: 2
- id: theater
  name: Theater
  cost: { gold: 180, wood: 60 }
  production: { type: influence, amount: 0.5 }
  workers: 5
  satisfaction_bonus: 10
  max_count: 1
- id: park
  name: Park
  cost: { gold: 30 }
  satisfaction_bonus: 5
  max_count: 3
"#;
