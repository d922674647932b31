//! Tick throughput check.
//!
//! Run with: cargo bench

// No criterion here; a timed loop is enough to catch regressions.

#[cfg(test)]
mod benches {
    use std::hint::black_box;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Instant;

    use bastion::{
        catalog::BuildingCatalog,
        engine::EngineSettings,
        resources::ResourceStock,
        systems::{build_engine, OpponentSettings},
        world::{Owner, Settlement, World},
    };

    fn large_world(catalog: &BuildingCatalog) -> World {
        let mut world = World::new(ResourceStock {
            food: 1_000_000.0,
            gold: 1_000_000.0,
            metal: 10_000.0,
            oil: 10_000.0,
            weapons: 10_000.0,
            ..ResourceStock::default()
        });
        for id in 0..500 {
            let owner = if id % 5 == 0 { Owner::Enemy } else { Owner::Player };
            let mut settlement = Settlement::new(id, format!("Town {id}"), owner, 5_000);
            settlement.population = 1_000;
            settlement.buildings = ["farm", "farm", "mine", "steel_mill", "barracks", "housing"]
                .iter()
                .map(|b| b.to_string())
                .collect();
            settlement.apply_catalog(catalog);
            world.insert_settlement(settlement);
        }
        world
    }

    #[test]
    fn benchmark_tick_performance() {
        let catalog = Arc::new(BuildingCatalog::standard());
        let mut world = large_world(&catalog);
        let mut engine = build_engine(
            EngineSettings {
                scenario_name: "bench".into(),
                seed: 1,
                snapshot_interval_ticks: 0,
                snapshot_dir: PathBuf::from("unused"),
                catalog,
            },
            OpponentSettings::default(),
        );

        let ticks = 100;
        let start = Instant::now();
        let stats = engine.run(&mut world, ticks, 1.0);
        let per_tick = start.elapsed() / ticks as u32;
        black_box(&world);

        assert_eq!(stats.completed, ticks);
        // Server ticks once per second.
        assert!(per_tick.as_millis() < 1_000, "tick took {per_tick:?}");
    }
}
