use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    engine::{System, SystemContext},
    rng::SystemRng,
    simulation::{self, TickReport},
    world::{Owner, SettlementUpdate, WorldError, WorldStore},
};

/// Runs the player economy against a snapshot taken from the store and
/// writes the results back.
pub struct EconomySystem {
    latest_report: Option<TickReport>,
}

impl EconomySystem {
    pub fn new() -> Self {
        Self {
            latest_report: None,
        }
    }

    pub fn latest_report(&self) -> Option<&TickReport> {
        self.latest_report.as_ref()
    }
}

impl Default for EconomySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for EconomySystem {
    fn name(&self) -> &str {
        "economy"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut dyn WorldStore,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let settlements = world.settlements();
        let pool = world.resource_pool();
        let player_ids: HashSet<_> = settlements
            .iter()
            .filter(|s| s.owner == Owner::Player)
            .map(|s| s.id)
            .collect();

        let outcome = simulation::advance(ctx.elapsed_seconds, &settlements, &pool, ctx.catalog);

        for next in outcome
            .settlements
            .iter()
            .filter(|s| player_ids.contains(&s.id))
        {
            match world.update_settlement(next.id, SettlementUpdate::tick_fields(next)) {
                Ok(()) => {}
                Err(WorldError::SettlementNotFound(id)) => {
                    warn!(settlement = id, "settlement vanished during tick, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }
        world.set_resource_pool(outcome.pool);
        world.set_player_totals(outcome.totals);

        let report = outcome.report;
        for id in &report.protests_started {
            info!(tick = ctx.tick, settlement = id, "protest started");
        }
        for id in &report.protests_ended {
            info!(tick = ctx.tick, settlement = id, "protest ended");
        }
        for id in &report.lost_control {
            warn!(tick = ctx.tick, settlement = id, "settlement lost to unrest");
        }
        debug!(
            tick = ctx.tick,
            food_consumed = report.food_consumed,
            influence = report.influence_produced,
            population = outcome.totals.population,
            "economy pass"
        );
        self.latest_report = Some(report);
        Ok(())
    }
}
