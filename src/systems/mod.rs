mod bookkeeping;
mod economy;
mod opponent;

pub use bookkeeping::BookkeepingSystem;
pub use economy::EconomySystem;
pub use opponent::{OpponentSettings, OpponentSystem};

use crate::engine::{Engine, EngineBuilder, EngineSettings};

/// The standard pipeline: player economy, then enemy reinforcement, then the
/// end-of-tick guard.
pub fn build_engine(settings: EngineSettings, opponent: OpponentSettings) -> Engine {
    EngineBuilder::new(settings)
        .with_system(EconomySystem::new())
        .with_system(OpponentSystem::new(opponent))
        .with_system(BookkeepingSystem::new())
        .build()
}
