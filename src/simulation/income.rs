use crate::catalog::BuildingCatalog;
use crate::resources::{IncomeSummary, ResourceStock};
use crate::world::{Owner, Settlement};

use super::taxation::{gold_rate, influence_bonus_rate};
use super::{FOOD_PER_CAPITA, PROTEST_PRODUCTION_MULTIPLIER};

/// Net per-second flow of every resource if the world stayed as it is now.
///
/// This is a projection for display, recomputed from current state rather
/// than from the deltas the last tick actually applied.
pub fn project_income(
    settlements: &[Settlement],
    pool: &ResourceStock,
    catalog: &BuildingCatalog,
) -> IncomeSummary {
    let mut income = IncomeSummary::default();
    let mut population_total = 0.0;

    for settlement in settlements.iter().filter(|s| s.owner == Owner::Player) {
        let population = settlement.population as f64;
        population_total += population;
        let multiplier = if settlement.is_protesting() {
            PROTEST_PRODUCTION_MULTIPLIER
        } else {
            1.0
        };
        let mut available_workers = population;

        for definition in catalog.iter() {
            for _ in 0..settlement.building_count(&definition.id) {
                if let Some(output) = definition.production {
                    let workers = f64::from(definition.workers);
                    if available_workers >= workers {
                        available_workers -= workers;
                        if pool.covers(&definition.consumption, 1.0) {
                            income.subtract_scaled(&definition.consumption, 1.0);
                            income[output.kind] += output.amount * multiplier;
                        }
                    }
                }
                if let Some(effect) = definition.military {
                    if population >= effect.population_use_per_unit
                        && pool.weapons >= effect.production_per_second
                    {
                        income.weapons -= effect.production_per_second;
                    }
                }
            }
        }

        let gold = gold_rate(population, settlement.tax_rate);
        if gold > 0.0 || pool.gold > 0.0 {
            income.gold += gold;
        }
        income.influence += influence_bonus_rate(settlement.satisfaction);
    }

    income.food -= population_total * FOOD_PER_CAPITA;
    income
}
