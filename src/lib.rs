pub mod broadcast;
pub mod catalog;
pub mod engine;
pub mod resources;
pub mod rng;
pub mod scenario;
pub mod simulation;
pub mod snapshot;
pub mod systems;
pub mod web;
pub mod world;

pub use catalog::BuildingCatalog;
pub use engine::{Engine, EngineBuilder, EngineSettings, TickSummary};
pub use resources::{Resource, ResourceStock};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{Settlement, World, WorldStore};
