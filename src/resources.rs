use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Every tradeable or consumable resource kind the faction can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Gold,
    Wood,
    Food,
    Oil,
    Metal,
    Steel,
    Weapons,
    Influence,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Gold,
        Resource::Wood,
        Resource::Food,
        Resource::Oil,
        Resource::Metal,
        Resource::Steel,
        Resource::Weapons,
        Resource::Influence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Gold => "gold",
            Resource::Wood => "wood",
            Resource::Food => "food",
            Resource::Oil => "oil",
            Resource::Metal => "metal",
            Resource::Steel => "steel",
            Resource::Weapons => "weapons",
            Resource::Influence => "influence",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount held (or flowing) per resource kind. Total over [`Resource`], so
/// there is no such thing as a missing key.
///
/// Used both for the shared resource pool and for per-second rate summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceStock {
    pub gold: f64,
    pub wood: f64,
    pub food: f64,
    pub oil: f64,
    pub metal: f64,
    pub steel: f64,
    pub weapons: f64,
    pub influence: f64,
}

/// Net per-second resource flow, for display.
pub type IncomeSummary = ResourceStock;

impl ResourceStock {
    pub fn iter(&self) -> impl Iterator<Item = (Resource, f64)> + '_ {
        Resource::ALL.into_iter().map(move |kind| (kind, self[kind]))
    }

    pub fn clamp_non_negative(&mut self) {
        for kind in Resource::ALL {
            let value = &mut self[kind];
            if !value.is_finite() || *value < 0.0 {
                *value = 0.0;
            }
        }
    }

    /// Whether every amount in `cost`, scaled by `factor`, is covered.
    pub fn covers(&self, cost: &ResourceStock, factor: f64) -> bool {
        cost.iter()
            .all(|(kind, amount)| amount <= 0.0 || self[kind] >= amount * factor)
    }

    pub fn subtract_scaled(&mut self, cost: &ResourceStock, factor: f64) {
        for (kind, amount) in cost.iter() {
            self[kind] -= amount * factor;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, amount)| amount == 0.0)
    }
}

impl Index<Resource> for ResourceStock {
    type Output = f64;

    fn index(&self, kind: Resource) -> &f64 {
        match kind {
            Resource::Gold => &self.gold,
            Resource::Wood => &self.wood,
            Resource::Food => &self.food,
            Resource::Oil => &self.oil,
            Resource::Metal => &self.metal,
            Resource::Steel => &self.steel,
            Resource::Weapons => &self.weapons,
            Resource::Influence => &self.influence,
        }
    }
}

impl IndexMut<Resource> for ResourceStock {
    fn index_mut(&mut self, kind: Resource) -> &mut f64 {
        match kind {
            Resource::Gold => &mut self.gold,
            Resource::Wood => &mut self.wood,
            Resource::Food => &mut self.food,
            Resource::Oil => &mut self.oil,
            Resource::Metal => &mut self.metal,
            Resource::Steel => &mut self.steel,
            Resource::Weapons => &mut self.weapons,
            Resource::Influence => &mut self.influence,
        }
    }
}

impl FromIterator<(Resource, f64)> for ResourceStock {
    fn from_iter<I: IntoIterator<Item = (Resource, f64)>>(iter: I) -> Self {
        let mut stock = ResourceStock::default();
        for (kind, amount) in iter {
            stock[kind] += amount;
        }
        stock
    }
}
