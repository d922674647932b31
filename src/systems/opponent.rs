use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    engine::{System, SystemContext},
    rng::SystemRng,
    world::{Owner, SettlementUpdate, WorldStore},
};

fn default_probability() -> f64 {
    0.1
}

fn default_reinforcement() -> u64 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpponentSettings {
    /// Chance per tick that an enemy settlement is reinforced.
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default = "default_reinforcement")]
    pub reinforcement: u64,
}

impl Default for OpponentSettings {
    fn default() -> Self {
        Self {
            probability: default_probability(),
            reinforcement: default_reinforcement(),
        }
    }
}

/// Randomly grows the garrisons of enemy settlements.
pub struct OpponentSystem {
    settings: OpponentSettings,
}

impl OpponentSystem {
    pub fn new(settings: OpponentSettings) -> Self {
        Self { settings }
    }
}

impl Default for OpponentSystem {
    fn default() -> Self {
        Self::new(OpponentSettings::default())
    }
}

impl System for OpponentSystem {
    fn name(&self) -> &str {
        "opponent"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut dyn WorldStore,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let probability = if self.settings.probability.is_nan() {
            0.0
        } else {
            self.settings.probability.clamp(0.0, 1.0)
        };
        for settlement in world.settlements() {
            if settlement.owner != Owner::Enemy {
                continue;
            }
            if !rng.gen_bool(probability) {
                continue;
            }
            let military = settlement
                .military
                .saturating_add(self.settings.reinforcement);
            world.update_settlement(
                settlement.id,
                SettlementUpdate {
                    military: Some(military),
                    ..SettlementUpdate::default()
                },
            )?;
            debug!(tick = ctx.tick, settlement = settlement.id, military, "enemy reinforced");
        }
        Ok(())
    }
}
