//! Background pre-warmer for the station network.
//!
//! Downloads and pre-aggregates every active cloud-coverage station so that
//! any user-facing query is served from cache. Runs once on boot in a
//! `tokio::spawn`'d task; safe to call `start` more than once since it is
//! guarded by the `idle` state.
//!
//! Deliberately low concurrency (see `AppConfig::prewarm_concurrency`) and a
//! cooperative yield between stations during aggregation, so it never
//! starves the axum server of resources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::services::aggregator::Resolution;
use crate::services::engine::LocationEngine;
use crate::services::upstream::{UpstreamClient, PARAM_CLOUD_COVERAGE, PARAM_PRESENT_WEATHER};

const ALL_RESOLUTIONS: [Resolution; 3] = [Resolution::Day, Resolution::Month, Resolution::Year];

/// Brief yield between stations during aggregation so the server isn't
/// starved of the async runtime.
const AGGREGATE_YIELD: Duration = Duration::from_millis(10);

/// Give the server a moment to finish booting before heavy I/O starts.
const STARTUP_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrewarmState {
    Idle,
    Starting,
    Downloading,
    Aggregating,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PrewarmStatus {
    pub state: PrewarmState,
    pub total_stations: usize,
    pub csv_done: usize,
    pub agg_done: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PrewarmStatus {
    fn new() -> Self {
        Self {
            state: PrewarmState::Idle,
            total_stations: 0,
            csv_done: 0,
            agg_done: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

pub type SharedPrewarmStatus = Arc<RwLock<PrewarmStatus>>;

/// Launch the pre-warmer in a background task.
///
/// Safe to call multiple times — subsequent calls are no-ops if the
/// pre-warmer is already running or has finished.
pub fn start(client: Arc<UpstreamClient>, engine: LocationEngine, concurrency: usize, status: SharedPrewarmStatus) {
    tokio::spawn(async move {
        {
            let mut s = status.write().await;
            if s.state != PrewarmState::Idle {
                return;
            }
            s.state = PrewarmState::Starting;
            s.started_at = Some(Utc::now());
        }
        run(client, engine, concurrency, status).await;
    });
}

async fn run(client: Arc<UpstreamClient>, engine: LocationEngine, concurrency: usize, status: SharedPrewarmStatus) {
    tokio::time::sleep(STARTUP_DELAY).await;

    tracing::info!("Pre-warmer: fetching station list...");
    let active_ids = match client.fetch_station_list(PARAM_CLOUD_COVERAGE).await {
        Ok(stations) => stations
            .into_iter()
            .filter(|s| s.active)
            .map(|s| s.key)
            .collect::<Vec<String>>(),
        Err(e) => {
            tracing::error!("Pre-warmer: failed to fetch station list: {}", e);
            let mut s = status.write().await;
            s.state = PrewarmState::Error;
            s.error = Some(e.to_string());
            return;
        }
    };

    {
        let mut s = status.write().await;
        s.total_stations = active_ids.len();
    }

    tracing::info!("Pre-warmer: downloading CSVs for {} stations...", active_ids.len());
    let t0 = Instant::now();
    download_csvs(&client, &active_ids, concurrency, &status).await;
    tracing::info!("Pre-warmer: CSV download done in {:.1}s", t0.elapsed().as_secs_f64());

    tracing::info!("Pre-warmer: aggregating...");
    let t0 = Instant::now();
    aggregate_stations(&engine, &active_ids, &status).await;
    tracing::info!("Pre-warmer: aggregation done in {:.1}s", t0.elapsed().as_secs_f64());

    let mut s = status.write().await;
    s.state = PrewarmState::Ready;
    s.finished_at = Some(Utc::now());
    tracing::info!("Pre-warmer: complete.");
}

/// Download both parameters' CSVs for every station to disk only (does not
/// keep parsed rows in memory — that would hold the whole network's history
/// at once).
async fn download_csvs(
    client: &Arc<UpstreamClient>,
    station_ids: &[String],
    concurrency: usize,
    status: &SharedPrewarmStatus,
) {
    {
        let mut s = status.write().await;
        s.state = PrewarmState::Downloading;
    }

    let tasks: Vec<(u32, String)> = station_ids
        .iter()
        .flat_map(|sid| {
            [
                (PARAM_CLOUD_COVERAGE, sid.clone()),
                (PARAM_PRESENT_WEATHER, sid.clone()),
            ]
        })
        .collect();

    let done = Arc::new(tokio::sync::Mutex::new(0usize));

    stream::iter(tasks.into_iter())
        .for_each_concurrent(concurrency, |(param_id, sid)| {
            let client = Arc::clone(client);
            let status = status.clone();
            let done = Arc::clone(&done);
            async move {
                if let Err(e) = client.fetch_station_csv(param_id, &sid).await {
                    tracing::warn!("Pre-warmer: CSV fetch failed: param={} station={}: {}", param_id, sid, e);
                }
                let mut count = done.lock().await;
                *count += 1;
                let mut s = status.write().await;
                s.csv_done = *count;
            }
        })
        .await;
}

/// Pre-compute result caches for every station at every resolution.
/// Sequential by design — this is how the result cache gets warmed without
/// spiking memory with many stations' parsed rows held at once.
async fn aggregate_stations(engine: &LocationEngine, station_ids: &[String], status: &SharedPrewarmStatus) {
    {
        let mut s = status.write().await;
        s.state = PrewarmState::Aggregating;
    }

    for (i, sid) in station_ids.iter().enumerate() {
        for res in ALL_RESOLUTIONS {
            let _ = engine.get_station_weather_data(sid, res).await;
        }
        let mut s = status.write().await;
        s.agg_done = i + 1;
        drop(s);
        tokio::time::sleep(AGGREGATE_YIELD).await;
    }
}

pub fn new_status() -> SharedPrewarmStatus {
    Arc::new(RwLock::new(PrewarmStatus::new()))
}
