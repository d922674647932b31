use anyhow::Result;
use tracing::warn;

use crate::{
    engine::{System, SystemContext},
    rng::SystemRng,
    world::{Owner, SettlementUpdate, WorldStore},
};

/// End-of-tick guard: keeps the pool non-negative and protest timers
/// consistent with ownership.
pub struct BookkeepingSystem;

impl BookkeepingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BookkeepingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BookkeepingSystem {
    fn name(&self) -> &str {
        "bookkeeping"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut dyn WorldStore,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let pool = world.resource_pool();
        if let Some((kind, amount)) = pool.iter().find(|(_, amount)| !(*amount >= 0.0)) {
            warn!(tick = ctx.tick, resource = %kind, amount, "resource pool out of range, clamping");
            let mut pool = pool;
            pool.clamp_non_negative();
            world.set_resource_pool(pool);
        }

        for settlement in world.settlements() {
            let stale_timer = match settlement.protest_timer {
                Some(timer) => settlement.owner != Owner::Player || !(timer > 0.0),
                None => false,
            };
            if stale_timer {
                world.update_settlement(
                    settlement.id,
                    SettlementUpdate {
                        protest_timer: Some(None),
                        ..SettlementUpdate::default()
                    },
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuildingCatalog;
    use crate::resources::ResourceStock;
    use crate::rng::RngManager;
    use crate::world::{Settlement, World};

    #[test]
    fn clears_timers_on_foreign_settlements() {
        let mut world = World::new(ResourceStock::default());
        let mut home = Settlement::new(1, "Home", Owner::Player, 100);
        home.protest_timer = Some(12.0);
        let mut lost = Settlement::new(2, "Lost", Owner::Neutral, 100);
        lost.protest_timer = Some(30.0);
        world.insert_settlement(home);
        world.insert_settlement(lost);

        let catalog = BuildingCatalog::standard();
        let ctx = SystemContext {
            tick: 1,
            elapsed_seconds: 1.0,
            scenario_name: "bookkeeping",
            catalog: &catalog,
        };
        let mut rng = RngManager::new(0);
        BookkeepingSystem::new()
            .run(&ctx, &mut world, &mut rng.stream("bookkeeping"))
            .unwrap();

        assert_eq!(world.settlement(1).unwrap().protest_timer, Some(12.0));
        assert_eq!(world.settlement(2).unwrap().protest_timer, None);
    }
}
