//! Player economy: production, population, satisfaction, unrest and taxes.
//!
//! [`advance`] is a pure function of its inputs. Settlements are processed one
//! after another in ascending id order against a single working copy of the
//! shared resource pool, so when two settlements compete for the last units of
//! a resource the lower id wins.

pub mod income;
pub mod protest;
pub mod taxation;

use serde::Serialize;

use crate::catalog::BuildingCatalog;
use crate::resources::{IncomeSummary, Resource, ResourceStock};
use crate::world::{Owner, PlayerTotals, Settlement, SettlementId, DEFAULT_SATISFACTION};

pub use income::project_income;
pub use protest::ProtestState;

pub const PROTEST_PRODUCTION_MULTIPLIER: f64 = 0.5;
pub const WORKER_SHORTAGE_PENALTY: f64 = 5.0;
/// Penalty per second at full strain (no idle inhabitants left).
pub const WORKER_STRAIN_PENALTY: f64 = 1.0;
pub const SATISFACTION_BONUS_SCALE: f64 = 0.1;
/// Inhabitants lost per second while the food pool is empty.
pub const STARVATION_RATE: f64 = 5.0;
pub const FOOD_PER_CAPITA: f64 = 0.1;

/// What happened during a tick, for logs and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub influence_produced: f64,
    pub food_consumed: f64,
    pub protests_started: Vec<SettlementId>,
    pub protests_ended: Vec<SettlementId>,
    pub lost_control: Vec<SettlementId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Every input settlement, ordered by id. Only player-owned ones change.
    pub settlements: Vec<Settlement>,
    pub pool: ResourceStock,
    pub income_summary: IncomeSummary,
    pub totals: PlayerTotals,
    pub report: TickReport,
}

#[derive(Debug, Default)]
struct BuildingTally {
    total_workers: f64,
    available_workers: f64,
    satisfaction_bonus: f64,
    population_growth: f64,
    population_used: f64,
    military_growth: f64,
    influence_produced: f64,
}

/// Advances every player settlement and the shared pool by `elapsed_seconds`.
pub fn advance(
    elapsed_seconds: f64,
    settlements: &[Settlement],
    pool: &ResourceStock,
    catalog: &BuildingCatalog,
) -> TickOutcome {
    let mut pool = *pool;
    let mut report = TickReport::default();
    // Checked once against the pool as it stood when the tick began; food
    // produced or consumed later in the pass does not change it.
    let no_food = pool.food <= 0.0;
    let mut influence_bonus = 0.0;

    let mut ordered: Vec<&Settlement> = settlements.iter().collect();
    ordered.sort_by_key(|s| s.id);

    let mut next = Vec::with_capacity(ordered.len());
    for settlement in ordered {
        if settlement.owner != Owner::Player {
            next.push(settlement.clone());
            continue;
        }
        let stepped = step_settlement(
            settlement,
            &mut pool,
            catalog,
            elapsed_seconds,
            no_food,
            &mut report,
        );
        influence_bonus += stepped.influence_bonus;
        next.push(stepped.settlement);
    }

    let population_total: f64 = player_settlements(&next)
        .map(|s| s.population as f64)
        .sum();
    let military_total: u64 = player_settlements(&next).map(|s| s.military).sum();

    let food_needed = population_total * FOOD_PER_CAPITA * elapsed_seconds;
    let mut aggregate_population = population_total;
    if pool.food < food_needed {
        aggregate_population = (aggregate_population - STARVATION_RATE * elapsed_seconds).max(0.0);
    }
    report.food_consumed = food_needed.min(pool.food.max(0.0));
    pool.food = (pool.food - food_needed).max(0.0);

    pool.influence += influence_bonus;
    report.influence_produced += influence_bonus;
    pool.clamp_non_negative();

    let income_summary = project_income(&next, &pool, catalog);
    TickOutcome {
        settlements: next,
        pool,
        income_summary,
        totals: PlayerTotals {
            population: aggregate_population.floor() as u64,
            military: military_total,
        },
        report,
    }
}

fn player_settlements(settlements: &[Settlement]) -> impl Iterator<Item = &Settlement> {
    settlements.iter().filter(|s| s.owner == Owner::Player)
}

struct SteppedSettlement {
    settlement: Settlement,
    influence_bonus: f64,
}

fn step_settlement(
    settlement: &Settlement,
    pool: &mut ResourceStock,
    catalog: &BuildingCatalog,
    elapsed_seconds: f64,
    no_food: bool,
    report: &mut TickReport,
) -> SteppedSettlement {
    let protest = ProtestState::from_timer(settlement.protest_timer);
    let multiplier = if protest.is_protesting() {
        PROTEST_PRODUCTION_MULTIPLIER
    } else {
        1.0
    };
    let population = settlement.population as f64;
    let tally = run_buildings(settlement, pool, catalog, elapsed_seconds, multiplier, no_food);

    let current_satisfaction = if settlement.satisfaction.is_finite() {
        settlement.satisfaction
    } else {
        DEFAULT_SATISFACTION
    };
    let satisfaction = (current_satisfaction
        + satisfaction_delta(population, &tally, settlement.tax_rate, elapsed_seconds))
    .clamp(0.0, 100.0);

    taxation::collect_taxes(pool, population, settlement.tax_rate, elapsed_seconds);

    let mut next = settlement.clone();
    let next_protest = protest.next(satisfaction, elapsed_seconds);
    match (protest, next_protest) {
        (_, ProtestState::LostControl) => {
            report.lost_control.push(settlement.id);
            next.owner = Owner::Neutral;
            next.satisfaction = DEFAULT_SATISFACTION;
            next.protest_timer = None;
            return SteppedSettlement {
                settlement: next,
                influence_bonus: 0.0,
            };
        }
        (ProtestState::Stable, ProtestState::Protesting(_)) => {
            report.protests_started.push(settlement.id)
        }
        (ProtestState::Protesting(_), ProtestState::Stable) => {
            report.protests_ended.push(settlement.id)
        }
        _ => {}
    }
    next.satisfaction = satisfaction;
    next.protest_timer = next_protest.timer();

    let influence_bonus = taxation::influence_bonus_rate(satisfaction) * elapsed_seconds;
    report.influence_produced += tally.influence_produced;

    let max_population = settlement.max_population as f64;
    let current = population + settlement.population_fraction;
    let projected = if pool.food <= 0.0 {
        current - STARVATION_RATE * elapsed_seconds
    } else {
        current + tally.population_growth - tally.population_used
    };
    let projected = projected.clamp(0.0, max_population);
    next.population = projected.floor() as u64;
    next.population_fraction = projected - projected.floor();

    let military = settlement.military as f64 + settlement.military_fraction + tally.military_growth;
    next.military = military.floor() as u64;
    next.military_fraction = military - military.floor();

    SteppedSettlement {
        settlement: next,
        influence_bonus,
    }
}

fn run_buildings(
    settlement: &Settlement,
    pool: &mut ResourceStock,
    catalog: &BuildingCatalog,
    elapsed_seconds: f64,
    multiplier: f64,
    no_food: bool,
) -> BuildingTally {
    let population = settlement.population as f64;
    let mut tally = BuildingTally {
        available_workers: population,
        ..BuildingTally::default()
    };

    for definition in catalog.iter() {
        for _ in 0..settlement.building_count(&definition.id) {
            let workers = f64::from(definition.workers);
            tally.total_workers += workers;
            tally.satisfaction_bonus += definition.satisfaction_bonus;

            if let Some(output) = definition.production {
                if tally.available_workers >= workers {
                    tally.available_workers -= workers;
                    if pool.covers(&definition.consumption, elapsed_seconds) {
                        pool.subtract_scaled(&definition.consumption, elapsed_seconds);
                        let produced = output.amount * elapsed_seconds * multiplier;
                        pool[output.kind] += produced;
                        if output.kind == Resource::Influence {
                            tally.influence_produced += produced;
                        }
                    }
                }
            }

            if let Some(effect) = definition.population {
                if !no_food {
                    tally.population_growth += effect.growth_per_second * elapsed_seconds;
                }
            }

            if let Some(effect) = definition.military {
                let weapons_needed = effect.production_per_second * elapsed_seconds;
                if population >= effect.population_use_per_unit && pool.weapons >= weapons_needed {
                    tally.military_growth += weapons_needed;
                    tally.population_used += effect.population_use_per_unit;
                    pool.weapons -= weapons_needed;
                }
            }
        }
    }
    tally
}

fn satisfaction_delta(
    population: f64,
    tally: &BuildingTally,
    tax_rate: u8,
    elapsed_seconds: f64,
) -> f64 {
    let mut delta = 0.0;
    if population - tally.total_workers < 0.0 {
        delta -= WORKER_SHORTAGE_PENALTY * elapsed_seconds;
    } else if tally.total_workers > 0.0 {
        let strain = (1.0 - tally.available_workers / tally.total_workers).max(0.0);
        delta -= strain * WORKER_STRAIN_PENALTY * elapsed_seconds;
    }
    delta += tally.satisfaction_bonus * elapsed_seconds * SATISFACTION_BONUS_SCALE;
    delta += taxation::tax_satisfaction_rate(tax_rate) * elapsed_seconds;
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CATALOG: &str = r#"
- id: farm
  name: Farm
  production: { type: food, amount: 10 }
  max_count: 5
- id: big_farm
  name: Big Farm
  production: { type: food, amount: 50 }
  max_count: 5
- id: refinery
  name: Refinery
  production: { type: gold, amount: 5 }
  consumption: { type: wood, amount: 1 }
  workers: 50
  max_count: 5
- id: steel_mill
  name: Steel Mill
  production: { type: steel, amount: 1 }
  consumption: { metal: 2, oil: 1 }
  max_count: 5
- id: housing
  name: Housing
  population: { housing: 100, growth_per_second: 0.5 }
  max_count: 5
- id: tenement
  name: Tenement
  population: { housing: 100, growth_per_second: 5 }
  max_count: 5
- id: barracks
  name: Barracks
  military: { production_per_second: 10, population_use_per_unit: 1 }
  max_count: 5
- id: drill_yard
  name: Drill Yard
  military: { production_per_second: 0.5, population_use_per_unit: 1 }
  max_count: 5
- id: shrine
  name: Shrine
  satisfaction_bonus: 100
  max_count: 5
"#;

    fn catalog() -> BuildingCatalog {
        BuildingCatalog::from_yaml_str(TEST_CATALOG).expect("test catalog parses")
    }

    fn town(id: SettlementId, population: u64, buildings: &[&str]) -> Settlement {
        let mut settlement = Settlement::new(id, format!("Town {id}"), Owner::Player, 1_000);
        settlement.population = population;
        settlement.buildings = buildings.iter().map(|b| b.to_string()).collect();
        settlement
    }

    fn stocked_food() -> ResourceStock {
        ResourceStock {
            food: 10_000.0,
            ..ResourceStock::default()
        }
    }

    #[test]
    fn farm_output_is_eaten_down_to_zero() {
        let settlement = town(1, 100, &["farm"]);
        let outcome = advance(10.0, &[settlement], &ResourceStock::default(), &catalog());
        assert_eq!(outcome.pool.food, 0.0);
        assert_eq!(outcome.settlements[0].population, 100);
        assert_eq!(outcome.report.food_consumed, 100.0);
    }

    #[test]
    fn satisfaction_below_threshold_starts_long_protest() {
        let mut settlement = town(1, 100, &[]);
        settlement.satisfaction = 29.0;
        let outcome = advance(1.0, &[settlement], &stocked_food(), &catalog());
        assert_eq!(outcome.settlements[0].protest_timer, Some(300.0));
        assert_eq!(outcome.report.protests_started, vec![1]);
    }

    #[test]
    fn barracks_without_enough_weapons_trains_nobody() {
        let settlement = town(1, 100, &["barracks"]);
        let pool = ResourceStock {
            weapons: 5.0,
            ..stocked_food()
        };
        let outcome = advance(1.0, &[settlement], &pool, &catalog());
        assert_eq!(outcome.pool.weapons, 5.0);
        assert_eq!(outcome.settlements[0].military, 0);
        assert_eq!(outcome.settlements[0].military_fraction, 0.0);
        assert_eq!(outcome.settlements[0].population, 100);
    }

    #[test]
    fn military_accumulates_across_ticks() {
        let settlement = town(1, 100, &["drill_yard"]);
        let pool = ResourceStock {
            weapons: 10.0,
            ..stocked_food()
        };
        let first = advance(1.0, &[settlement], &pool, &catalog());
        assert_eq!(first.settlements[0].military, 0);
        assert_eq!(first.pool.weapons, 9.5);
        let second = advance(1.0, &first.settlements, &first.pool, &catalog());
        assert_eq!(second.settlements[0].military, 1);
        assert_eq!(second.totals.military, 1);
    }

    #[test]
    fn collapse_to_zero_gets_short_timer() {
        let mut settlement = town(1, 100, &[]);
        settlement.satisfaction = 2.0;
        settlement.tax_rate = 10;
        let outcome = advance(1.0, &[settlement], &stocked_food(), &catalog());
        assert_eq!(outcome.settlements[0].satisfaction, 0.0);
        assert_eq!(outcome.settlements[0].protest_timer, Some(60.0));
    }

    #[test]
    fn recovered_settlement_returns_to_stable() {
        let mut settlement = town(1, 100, &[]);
        settlement.satisfaction = 29.0;
        settlement.tax_rate = 0;
        settlement.protest_timer = Some(100.0);
        let outcome = advance(1.0, &[settlement], &stocked_food(), &catalog());
        let next = &outcome.settlements[0];
        assert_eq!(next.satisfaction, 31.5);
        assert_eq!(next.protest_timer, None);
        assert_eq!(next.owner, Owner::Player);
        assert_eq!(outcome.report.protests_ended, vec![1]);
    }

    #[test]
    fn expired_protest_loses_control_without_other_changes() {
        let mut settlement = town(1, 100, &["tenement", "drill_yard"]);
        settlement.satisfaction = 10.0;
        settlement.protest_timer = Some(1.0);
        settlement.military = 7;
        let pool = ResourceStock {
            weapons: 100.0,
            ..stocked_food()
        };
        let outcome = advance(1.0, &[settlement], &pool, &catalog());
        let next = &outcome.settlements[0];
        assert_eq!(next.owner, Owner::Neutral);
        assert_eq!(next.satisfaction, 50.0);
        assert_eq!(next.protest_timer, None);
        assert_eq!(next.population, 100);
        assert_eq!(next.military, 7);
        assert_eq!(outcome.report.lost_control, vec![1]);
    }

    #[test]
    fn zero_tax_drains_gold_without_going_negative() {
        let mut settlement = town(1, 100, &[]);
        settlement.tax_rate = 0;
        let pool = ResourceStock {
            gold: 1_000.0,
            ..stocked_food()
        };
        let outcome = advance(2.0, &[settlement.clone()], &pool, &catalog());
        assert_eq!(outcome.pool.gold, 900.0);

        let poor = ResourceStock {
            gold: 10.0,
            ..stocked_food()
        };
        let outcome = advance(2.0, &[settlement], &poor, &catalog());
        assert_eq!(outcome.pool.gold, 0.0);
    }

    #[test]
    fn understaffed_building_skips_production_every_time() {
        let settlement = town(1, 20, &["refinery"]);
        let pool = ResourceStock {
            wood: 10.0,
            ..stocked_food()
        };
        let first = advance(1.0, &[settlement.clone()], &pool, &catalog());
        let second = advance(1.0, &[settlement], &pool, &catalog());
        assert_eq!(first, second);
        assert_eq!(first.pool.wood, 10.0);
        // Tax income only: 20 inhabitants at the neutral rate.
        assert_eq!(first.pool.gold, 20.0);
        // Demand of 50 workers against 20 inhabitants.
        assert_eq!(first.settlements[0].satisfaction, 45.0);
    }

    #[test]
    fn unaffordable_consumption_produces_nothing() {
        let settlement = town(1, 100, &["steel_mill"]);
        let pool = ResourceStock {
            metal: 1.0,
            oil: 5.0,
            ..stocked_food()
        };
        let outcome = advance(1.0, &[settlement], &pool, &catalog());
        assert_eq!(outcome.pool.steel, 0.0);
        assert_eq!(outcome.pool.metal, 1.0);
        assert_eq!(outcome.pool.oil, 5.0);
    }

    #[test]
    fn lower_id_wins_contested_inputs() {
        let first = town(1, 100, &["steel_mill"]);
        let second = town(2, 100, &["steel_mill"]);
        let pool = ResourceStock {
            metal: 2.0,
            oil: 1.0,
            ..stocked_food()
        };
        let outcome = advance(1.0, &[second, first], &pool, &catalog());
        assert_eq!(outcome.pool.steel, 1.0);
        assert_eq!(outcome.pool.metal, 0.0);
        let ids: Vec<_> = outcome.settlements.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn protest_halves_production() {
        let mut settlement = town(1, 100, &["farm"]);
        settlement.satisfaction = 20.0;
        settlement.protest_timer = Some(200.0);
        let outcome = advance(1.0, &[settlement], &ResourceStock::default(), &catalog());
        // 5 food produced, 10 eaten.
        assert_eq!(outcome.pool.food, 0.0);
        assert_eq!(outcome.report.food_consumed, 5.0);
        assert_eq!(outcome.settlements[0].protest_timer, Some(199.0));
    }

    #[test]
    fn growth_checks_food_at_tick_start() {
        // The farm refills the pool within the tick, but growth was already
        // ruled out by the empty pool at the start.
        let settlement = town(1, 100, &["big_farm", "tenement"]);
        let first = advance(1.0, &[settlement], &ResourceStock::default(), &catalog());
        assert_eq!(first.settlements[0].population, 100);
        assert_eq!(first.pool.food, 40.0);

        let second = advance(1.0, &first.settlements, &first.pool, &catalog());
        assert_eq!(second.settlements[0].population, 105);
    }

    #[test]
    fn slow_growth_carries_fractions() {
        let settlement = town(1, 100, &["housing"]);
        let first = advance(1.0, &[settlement], &stocked_food(), &catalog());
        assert_eq!(first.settlements[0].population, 100);
        assert_eq!(first.settlements[0].population_fraction, 0.5);
        let second = advance(1.0, &first.settlements, &first.pool, &catalog());
        assert_eq!(second.settlements[0].population, 101);
    }

    #[test]
    fn starvation_hits_settlement_and_aggregate() {
        let settlement = town(1, 100, &[]);
        let outcome = advance(1.0, &[settlement], &ResourceStock::default(), &catalog());
        assert_eq!(outcome.settlements[0].population, 95);
        assert_eq!(outcome.totals.population, 90);
        assert_eq!(outcome.pool.food, 0.0);
    }

    #[test]
    fn content_settlements_earn_influence() {
        let mut settlement = town(1, 100, &[]);
        settlement.satisfaction = 95.0;
        let outcome = advance(2.0, &[settlement], &stocked_food(), &catalog());
        assert_eq!(outcome.pool.influence, 6.0);
        assert_eq!(outcome.report.influence_produced, 6.0);
    }

    #[test]
    fn non_player_settlements_pass_through() {
        let mut enemy = town(3, 100, &["farm", "tenement"]);
        enemy.owner = Owner::Enemy;
        enemy.satisfaction = 0.0;
        let mut neutral = town(4, 50, &["farm"]);
        neutral.owner = Owner::Neutral;
        let pool = stocked_food();
        let outcome = advance(5.0, &[enemy.clone(), neutral.clone()], &pool, &catalog());
        assert_eq!(outcome.settlements, vec![enemy, neutral]);
        assert_eq!(outcome.pool, pool);
        assert_eq!(outcome.totals, PlayerTotals::default());
    }

    #[test]
    fn population_and_satisfaction_stay_in_bounds() {
        let catalog = catalog();
        let mut settlements = vec![
            town(1, 990, &["tenement", "tenement", "tenement", "shrine"]),
            town(2, 3, &["refinery", "refinery", "barracks"]),
            town(3, 0, &["housing"]),
        ];
        settlements[1].tax_rate = 10;
        settlements[1].satisfaction = 1.0;
        settlements[2].satisfaction = 100.0;
        let mut pool = ResourceStock {
            food: 50.0,
            weapons: 3.0,
            wood: 2.0,
            ..ResourceStock::default()
        };
        for step in 0..200 {
            let elapsed = if step % 3 == 0 { 0.5 } else { 1.7 };
            let outcome = advance(elapsed, &settlements, &pool, &catalog);
            for settlement in &outcome.settlements {
                assert!(settlement.population <= settlement.max_population);
                assert!((0.0..=100.0).contains(&settlement.satisfaction));
                assert_eq!(settlement.protest_timer.is_some(), settlement.is_protesting());
            }
            for (_, amount) in outcome.pool.iter() {
                assert!(amount >= 0.0);
            }
            settlements = outcome.settlements;
            pool = outcome.pool;
        }
    }
}
