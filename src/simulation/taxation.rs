use crate::resources::ResourceStock;

/// Tax rate at which taxes neither please nor anger the population.
pub const NEUTRAL_TAX_RATE: f64 = 5.0;
pub const TAX_SATISFACTION_FACTOR: f64 = 0.5;
/// Gold per inhabitant per second spent when taxes are abolished.
pub const UPKEEP_PER_CAPITA: f64 = 0.5;

/// Satisfaction per second from the tax level. Positive below the neutral
/// rate, negative above it.
pub fn tax_satisfaction_rate(tax_rate: u8) -> f64 {
    (NEUTRAL_TAX_RATE - f64::from(tax_rate)) * TAX_SATISFACTION_FACTOR
}

/// Gold per second a settlement yields (positive) or costs (negative) at the
/// given rate, before any floor is applied.
pub fn gold_rate(population: f64, tax_rate: u8) -> f64 {
    if tax_rate == 0 {
        -population * UPKEEP_PER_CAPITA
    } else {
        population * (f64::from(tax_rate) / NEUTRAL_TAX_RATE)
    }
}

/// Applies one settlement's taxes to the pool and returns the gold delta.
/// Upkeep never pushes gold below zero.
pub fn collect_taxes(
    pool: &mut ResourceStock,
    population: f64,
    tax_rate: u8,
    elapsed_seconds: f64,
) -> f64 {
    let delta = gold_rate(population, tax_rate) * elapsed_seconds;
    let applied = if delta < 0.0 {
        -pool.gold.max(0.0).min(-delta)
    } else {
        delta
    };
    pool.gold += applied;
    applied
}

/// Influence per second earned from a contented settlement.
pub fn influence_bonus_rate(satisfaction: f64) -> f64 {
    if satisfaction > 90.0 {
        3.0
    } else if satisfaction > 70.0 {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tax_drains_up_to_available_gold() {
        let mut pool = ResourceStock {
            gold: 30.0,
            ..ResourceStock::default()
        };
        let delta = collect_taxes(&mut pool, 100.0, 0, 1.0);
        assert_eq!(delta, -30.0);
        assert_eq!(pool.gold, 0.0);

        let mut pool = ResourceStock {
            gold: 500.0,
            ..ResourceStock::default()
        };
        collect_taxes(&mut pool, 100.0, 0, 2.0);
        assert_eq!(pool.gold, 400.0);
    }

    #[test]
    fn taxes_scale_with_rate() {
        let mut pool = ResourceStock::default();
        collect_taxes(&mut pool, 100.0, 10, 1.5);
        assert_eq!(pool.gold, 300.0);
    }

    #[test]
    fn satisfaction_effect_is_neutral_at_five() {
        assert_eq!(tax_satisfaction_rate(5), 0.0);
        assert_eq!(tax_satisfaction_rate(0), 2.5);
        assert_eq!(tax_satisfaction_rate(10), -2.5);
    }

    #[test]
    fn influence_bonus_thresholds_are_strict() {
        assert_eq!(influence_bonus_rate(90.0), 1.0);
        assert_eq!(influence_bonus_rate(90.5), 3.0);
        assert_eq!(influence_bonus_rate(70.0), 0.0);
    }
}
