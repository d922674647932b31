use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, time::MissedTickBehavior};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::{
    broadcast::{build_messages, Broadcaster, GameMessage},
    catalog::{BuildingCatalog, BuildingDefinition},
    engine::{Engine, EngineSettings, TickSummary},
    resources::{IncomeSummary, ResourceStock},
    scenario::Scenario,
    simulation::project_income,
    systems::build_engine,
    world::{PlayerTotals, Settlement, SettlementId, World, WorldError},
};

pub type SharedWorld = Arc<Mutex<World>>;

#[derive(Clone)]
pub struct AppState {
    world: SharedWorld,
    broadcaster: Broadcaster,
    catalog: Arc<BuildingCatalog>,
    scenario_name: String,
}

impl AppState {
    pub fn new(
        world: SharedWorld,
        broadcaster: Broadcaster,
        catalog: Arc<BuildingCatalog>,
        scenario_name: impl Into<String>,
    ) -> Self {
        Self {
            world,
            broadcaster,
            catalog,
            scenario_name: scenario_name.into(),
        }
    }

    fn lock_world(&self) -> MutexGuard<'_, World> {
        lock(&self.world)
    }
}

// Poisoned locks are recovered; the world is still structurally valid.
fn lock(world: &Mutex<World>) -> MutexGuard<'_, World> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub world: World,
    pub catalog: Arc<BuildingCatalog>,
    pub snapshot_interval: u64,
    pub snapshot_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

/// Runs one tick against the shared world and fans the result out. The world
/// lock is released before anything is published.
pub fn step(
    engine: &mut Engine,
    world: &Mutex<World>,
    broadcaster: &Broadcaster,
    elapsed_seconds: f64,
) -> Result<TickSummary> {
    let (summary, messages) = {
        let mut guard = lock(world);
        let summary = engine.tick(&mut guard, elapsed_seconds)?;
        let messages = build_messages(&*guard, engine.catalog());
        (summary, messages)
    };
    for message in &messages {
        if let Err(err) = broadcaster.publish(message) {
            warn!("failed to encode broadcast frame: {err}");
        }
    }
    Ok(summary)
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        world,
        catalog,
        snapshot_interval,
        snapshot_dir,
        host,
        port,
    } = config;

    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        snapshot_interval_ticks: snapshot_interval,
        snapshot_dir,
        catalog: catalog.clone(),
    };
    let mut engine = build_engine(settings, scenario.opponent);

    let shared: SharedWorld = Arc::new(Mutex::new(world));
    let broadcaster = Broadcaster::new();
    let state = AppState::new(
        shared.clone(),
        broadcaster.clone(),
        catalog,
        scenario.name.clone(),
    );

    let period = Duration::from_millis(scenario.tick_interval_ms.max(1));
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;
        let mut last = Instant::now();
        loop {
            interval.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last).as_secs_f64();
            last = now;
            match step(&mut engine, &shared, &broadcaster, elapsed) {
                Ok(summary) => debug!(tick = summary.tick, elapsed, "server tick"),
                Err(err) => error!("tick failed, skipping: {err:#}"),
            }
        }
    });

    let router = router(state);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, scenario = %scenario.name, "serving (Ctrl+C to stop)");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    ticker.abort();
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/catalog", get(catalog))
        .route("/api/events", get(stream_events))
        .route("/api/settlements/:id/tax", post(set_tax))
        .route("/api/settlements/:id/buildings", post(construct))
        .with_state(Arc::new(state))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {err}");
    }
    info!("shutting down");
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub scenario: String,
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub totals: PlayerTotals,
    pub resource_pool: ResourceStock,
    pub income_summary: IncomeSummary,
    pub settlements: Vec<Settlement>,
}

async fn latest_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let world = state.lock_world();
    let snapshot = world.snapshot(&state.scenario_name);
    let income_summary =
        project_income(&snapshot.settlements, &snapshot.resource_pool, &state.catalog);
    Json(StateResponse {
        scenario: snapshot.scenario,
        tick: snapshot.tick,
        elapsed_seconds: snapshot.elapsed_seconds,
        totals: snapshot.totals,
        resource_pool: snapshot.resource_pool,
        income_summary,
        settlements: snapshot.settlements,
    })
}

async fn catalog(State(state): State<Arc<AppState>>) -> Json<Vec<BuildingDefinition>> {
    Json(state.catalog.iter().cloned().collect())
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRequest {
    pub tax_rate: u8,
}

#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub building: String,
}

async fn set_tax(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SettlementId>,
    Json(request): Json<TaxRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let (settlement, message) = {
        let mut world = state.lock_world();
        world.set_tax_rate(id, request.tax_rate)?;
        (
            settlement_or_missing(&world, id)?,
            GameMessage::cities_update(&*world),
        )
    };
    info!(settlement = id, tax_rate = request.tax_rate, "tax rate changed");
    publish(&state, &message);
    Ok(Json(settlement))
}

async fn construct(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SettlementId>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let (settlement, messages) = {
        let mut world = state.lock_world();
        world.construct(id, &request.building, &state.catalog)?;
        (
            settlement_or_missing(&world, id)?,
            build_messages(&*world, &state.catalog),
        )
    };
    info!(settlement = id, building = %request.building, "building constructed");
    for message in &messages {
        publish(&state, message);
    }
    Ok(Json(settlement))
}

fn settlement_or_missing(world: &World, id: SettlementId) -> Result<Settlement, WorldError> {
    world
        .settlement(id)
        .cloned()
        .ok_or(WorldError::SettlementNotFound(id))
}

fn publish(state: &AppState, message: &GameMessage) {
    if let Err(err) = state.broadcaster.publish(message) {
        warn!("failed to encode broadcast frame: {err}");
    }
}

#[derive(Debug)]
pub struct ApiError(WorldError);

impl From<WorldError> for ApiError {
    fn from(err: WorldError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            WorldError::SettlementNotFound(_) | WorldError::UnknownBuilding(_) => {
                StatusCode::NOT_FOUND
            }
            WorldError::NotPlayerOwned(_) => StatusCode::FORBIDDEN,
            WorldError::BuildingUnavailable { .. }
            | WorldError::BuildingLimitReached { .. }
            | WorldError::InsufficientResources(_) => StatusCode::CONFLICT,
            WorldError::InvalidTaxRate(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineBuilder;
    use crate::systems::{EconomySystem, OpponentSettings};
    use crate::world::Owner;

    fn state() -> AppState {
        let catalog = Arc::new(BuildingCatalog::standard());
        let mut world = World::new(ResourceStock {
            gold: 100.0,
            wood: 100.0,
            food: 500.0,
            ..ResourceStock::default()
        });
        let mut home = Settlement::new(1, "Home", Owner::Player, 500);
        home.population = 100;
        home.apply_catalog(&catalog);
        world.insert_settlement(home);
        let mut fort = Settlement::new(2, "Fort", Owner::Enemy, 500);
        fort.apply_catalog(&catalog);
        world.insert_settlement(fort);
        AppState::new(
            Arc::new(Mutex::new(world)),
            Broadcaster::new(),
            catalog,
            "web",
        )
    }

    #[tokio::test]
    async fn tax_change_is_applied_and_broadcast() {
        let state = Arc::new(state());
        let mut rx = state.broadcaster.subscribe();
        let Json(settlement) = set_tax(
            State(state.clone()),
            Path(1),
            Json(TaxRequest { tax_rate: 8 }),
        )
        .await
        .unwrap();
        assert_eq!(settlement.tax_rate, 8);
        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "CITIES_UPDATE");
        assert_eq!(frame["settlements"][0]["taxRate"], 8);
    }

    #[tokio::test]
    async fn action_errors_map_to_status_codes() {
        let state = Arc::new(state());
        let err = set_tax(
            State(state.clone()),
            Path(1),
            Json(TaxRequest { tax_rate: 11 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = set_tax(State(state.clone()), Path(9), Json(TaxRequest { tax_rate: 3 }))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = construct(
            State(state.clone()),
            Path(2),
            Json(BuildRequest {
                building: "farm".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = construct(
            State(state),
            Path(1),
            Json(BuildRequest {
                building: "theater".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn construction_pays_cost() {
        let state = Arc::new(state());
        let Json(settlement) = construct(
            State(state.clone()),
            Path(1),
            Json(BuildRequest {
                building: "farm".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(settlement.building_count("farm"), 1);
        let Json(current) = latest_state(State(state)).await;
        assert_eq!(current.resource_pool.gold, 50.0);
        assert_eq!(current.resource_pool.wood, 80.0);
    }

    #[test]
    fn step_ticks_and_publishes_both_frames() {
        let state = state();
        let mut engine = EngineBuilder::new(EngineSettings {
            scenario_name: "web".into(),
            seed: 1,
            snapshot_interval_ticks: 0,
            snapshot_dir: PathBuf::from("unused"),
            catalog: state.catalog.clone(),
        })
        .with_system(EconomySystem::new())
        .build();
        let mut rx = state.broadcaster.subscribe();

        let summary = step(&mut engine, &state.world, &state.broadcaster, 1.0).unwrap();
        assert_eq!(summary.tick, 1);
        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "GAME_UPDATE");
        assert_eq!(second["type"], "CITIES_UPDATE");
        assert_eq!(state.lock_world().tick(), 1);
    }

    #[test]
    fn failed_step_publishes_nothing() {
        let state = state();
        let mut engine = build_engine(
            EngineSettings {
                scenario_name: "web".into(),
                seed: 1,
                snapshot_interval_ticks: 0,
                snapshot_dir: PathBuf::from("unused"),
                catalog: state.catalog.clone(),
            },
            OpponentSettings::default(),
        );
        let mut rx = state.broadcaster.subscribe();
        assert!(step(&mut engine, &state.world, &state.broadcaster, -1.0).is_err());
        assert!(rx.try_recv().is_err());
    }
}
