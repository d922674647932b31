use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::world::{World, WorldSnapshot};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    pub written_at: DateTime<Utc>,
    #[serde(flatten)]
    pub world: WorldSnapshot,
}

/// Writes the world to `<dir>/<scenario>/tick_NNNNNN.json` every
/// `interval_ticks` ticks. An interval of zero disables snapshots.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval_ticks: u64,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval_ticks: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval_ticks,
        }
    }

    pub fn maybe_write(&self, world: &World, scenario_name: &str) -> Result<Option<PathBuf>> {
        let tick = world.tick();
        if self.interval_ticks == 0 || tick == 0 || tick % self.interval_ticks != 0 {
            return Ok(None);
        }
        let dir = self.dir.join(scenario_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        let path = dir.join(format!("tick_{tick:06}.json"));
        let file = SnapshotFile {
            written_at: Utc::now(),
            world: world.snapshot(scenario_name),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        Ok(Some(path))
    }
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<SnapshotFile> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}
