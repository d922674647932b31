use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    catalog::BuildingCatalog,
    resources::{IncomeSummary, ResourceStock},
    simulation::project_income,
    world::{Settlement, WorldStore},
};

/// Capacity of the fan-out channel. Subscribers further behind than this
/// skip ahead to the newest frames.
pub const CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum GameMessage {
    #[serde(rename = "GAME_UPDATE", rename_all = "camelCase")]
    GameUpdate {
        resource_pool: ResourceStock,
        income_summary: IncomeSummary,
    },
    #[serde(rename = "CITIES_UPDATE")]
    CitiesUpdate { settlements: Vec<Settlement> },
}

impl GameMessage {
    pub fn game_update(store: &dyn WorldStore, catalog: &BuildingCatalog) -> Self {
        let resource_pool = store.resource_pool();
        let income_summary = project_income(&store.settlements(), &resource_pool, catalog);
        GameMessage::GameUpdate {
            resource_pool,
            income_summary,
        }
    }

    pub fn cities_update(store: &dyn WorldStore) -> Self {
        GameMessage::CitiesUpdate {
            settlements: store.settlements(),
        }
    }
}

/// The two frames sent after every tick, in send order.
pub fn build_messages(store: &dyn WorldStore, catalog: &BuildingCatalog) -> [GameMessage; 2] {
    [
        GameMessage::game_update(store, catalog),
        GameMessage::cities_update(store),
    ]
}

/// Fire-and-forget fan-out of serialized frames to every connected client.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<String>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sends `message` to all current subscribers and returns how many there
    /// were. Having none is not an error.
    pub fn publish(&self, message: &GameMessage) -> serde_json::Result<usize> {
        let payload = serde_json::to_string(message)?;
        match self.sender.send(payload) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                debug!("no subscribers for broadcast frame");
                Ok(0)
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
