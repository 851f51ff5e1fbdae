//! Station discovery, listing, and adaptive selection.
//!
//! Knows how to find network stations, rank them by distance, and
//! adaptively select a subset using an IDW weight threshold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::services::upstream::{RawStation, UpstreamClient, PARAM_CLOUD_COVERAGE, PARAM_PRESENT_WEATHER};

/// Per-parameter station roster cache, fresh for 24 hours.
const ROSTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A station ranked by distance from a query point.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
}

/// A listing entry with per-parameter capability flags.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StationListing {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub has_cloud_data: bool,
    pub has_lightning_data: bool,
}

/// A candidate plus the raw (un-normalized) inverse-distance weight it was
/// assigned during adaptive selection.
#[derive(Debug, Clone)]
pub struct SelectedStation {
    pub candidate: Candidate,
    pub raw_weight: f64,
}

/// Minimum number of stations always included, regardless of weight.
const MIN_STATIONS: usize = 2;
/// Stop adding stations once the next one would contribute less than this
/// fraction of the cumulative weight.
const WEIGHT_THRESHOLD: f64 = 0.02;
/// Clamp distances below this value (km) to avoid division by zero.
const MIN_DIST_KM: f64 = 0.1;

/// Great-circle distance in km between two points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Adaptively select stations from a distance-sorted candidate list.
///
/// Uses inverse-distance weighting (power=2) and stops adding stations once
/// the next candidate would contribute less than `WEIGHT_THRESHOLD` of the
/// cumulative total. At least `MIN_STATIONS` are always included.
///
/// `candidates` must already be sorted by `distance_km` ascending.
pub fn select_stations(candidates: &[Candidate]) -> Vec<SelectedStation> {
    let mut selected: Vec<SelectedStation> = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        let dist = c.distance_km.max(MIN_DIST_KM);
        let raw_weight = 1.0 / (dist * dist);

        if i >= MIN_STATIONS {
            let total_so_far: f64 = selected.iter().map(|s| s.raw_weight).sum();
            if raw_weight / (total_so_far + raw_weight) < WEIGHT_THRESHOLD {
                break;
            }
        }

        selected.push(SelectedStation {
            candidate: c.clone(),
            raw_weight,
        });
    }
    selected
}

struct RosterEntry {
    fetched_at: Instant,
    stations: Vec<RawStation>,
}

/// Fetches and caches per-parameter station rosters, and exposes the
/// distance-ranking and merged-listing queries built on top of them.
#[derive(Clone)]
pub struct StationCatalog {
    client: Arc<UpstreamClient>,
    rosters: Arc<RwLock<HashMap<u32, RosterEntry>>>,
}

impl StationCatalog {
    pub fn new(client: Arc<UpstreamClient>) -> Self {
        Self {
            client,
            rosters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn roster(&self, parameter_id: u32) -> Result<Vec<RawStation>, AppError> {
        {
            let guard = self.rosters.read().await;
            if let Some(entry) = guard.get(&parameter_id) {
                if entry.fetched_at.elapsed() < ROSTER_TTL {
                    return Ok(entry.stations.clone());
                }
            }
        }

        let stations = self.client.fetch_station_list(parameter_id).await?;
        let mut guard = self.rosters.write().await;
        guard.insert(
            parameter_id,
            RosterEntry {
                fetched_at: Instant::now(),
                stations: stations.clone(),
            },
        );
        Ok(stations)
    }

    /// Return the `count` nearest active cloud-coverage stations to (lat, lng).
    pub async fn get_nearby(
        &self,
        lat: f64,
        lng: f64,
        parameter_id: u32,
        count: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        let raw = self.roster(parameter_id).await?;

        let mut candidates: Vec<Candidate> = raw
            .into_iter()
            .filter(|s| s.active)
            .map(|s| {
                let distance_km = (haversine_km(lat, lng, s.latitude, s.longitude) * 10.0).round() / 10.0;
                Candidate {
                    id: s.key,
                    name: s.name,
                    latitude: s.latitude,
                    longitude: s.longitude,
                    distance_km,
                }
            })
            .collect();

        candidates.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap());
        candidates.truncate(count);
        Ok(candidates)
    }

    /// Default nearby-station count used by the façade when none is given.
    pub const DEFAULT_NEARBY_COUNT: usize = 10;

    /// Return every active station from either roster, exactly once, with
    /// flags for which parameters it supports.
    pub async fn get_all(&self) -> Result<Vec<StationListing>, AppError> {
        let cloud_raw = self.roster(PARAM_CLOUD_COVERAGE).await?;
        let weather_raw = self.roster(PARAM_PRESENT_WEATHER).await?;

        let cloud_by_id: HashMap<&str, &RawStation> =
            cloud_raw.iter().filter(|s| s.active).map(|s| (s.key.as_str(), s)).collect();
        let weather_by_id: HashMap<&str, &RawStation> =
            weather_raw.iter().filter(|s| s.active).map(|s| (s.key.as_str(), s)).collect();

        let mut ids: Vec<&str> = cloud_by_id.keys().chain(weather_by_id.keys()).copied().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut listings: Vec<StationListing> = ids
            .into_iter()
            .map(|id| {
                let station = *cloud_by_id.get(id).unwrap_or_else(|| &weather_by_id[id]);
                StationListing {
                    id: station.key.clone(),
                    name: station.name.clone(),
                    latitude: station.latitude,
                    longitude: station.longitude,
                    has_cloud_data: cloud_by_id.contains_key(id),
                    has_lightning_data: weather_by_id.contains_key(id),
                }
            })
            .collect();

        listings.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listings)
    }

    /// Whether a station id is active in either the cloud-coverage or
    /// present-weather roster.
    pub async fn station_known(&self, station_id: &str) -> Result<bool, AppError> {
        let cloud_raw = self.roster(PARAM_CLOUD_COVERAGE).await?;
        if cloud_raw.iter().any(|s| s.active && s.key == station_id) {
            return Ok(true);
        }
        let weather_raw = self.roster(PARAM_PRESENT_WEATHER).await?;
        Ok(weather_raw.iter().any(|s| s.active && s.key == station_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Stockholm to Gothenburg, roughly 397 km apart.
        let d = haversine_km(59.3293, 18.0686, 57.7089, 11.9746);
        assert!((d - 397.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_haversine_same_point() {
        assert_eq!(haversine_km(59.0, 18.0, 59.0, 18.0), 0.0);
    }

    fn candidate(id: &str, distance_km: f64) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: id.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            distance_km,
        }
    }

    #[test]
    fn test_select_stations_always_includes_minimum() {
        let candidates = vec![candidate("a", 1.0), candidate("b", 2.0)];
        let selected = select_stations(&candidates);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_select_stations_cuts_off_far_outlier() {
        let candidates = vec![candidate("a", 1.0), candidate("b", 10.0), candidate("c", 1000.0)];
        let selected = select_stations(&candidates);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].candidate.id, "a");
        assert_eq!(selected[1].candidate.id, "b");
    }

    #[test]
    fn test_select_stations_keeps_close_third() {
        let candidates = vec![candidate("a", 1.0), candidate("b", 1.2), candidate("c", 1.5)];
        let selected = select_stations(&candidates);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_select_stations_distance_floor() {
        let candidates = vec![candidate("a", 0.0), candidate("b", 0.05)];
        let selected = select_stations(&candidates);
        // Both clamp to MIN_DIST_KM so weights are equal.
        assert!((selected[0].raw_weight - selected[1].raw_weight).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_get_all_unions_both_rosters() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/parameter/16.json"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "station": [
                    {"key": "A", "name": "Cloud Only", "latitude": 59.0, "longitude": 18.0, "active": true},
                    {"key": "B", "name": "Both", "latitude": 58.0, "longitude": 17.0, "active": true},
                ]
            })))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/parameter/13.json"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "station": [
                    {"key": "B", "name": "Both", "latitude": 58.0, "longitude": 17.0, "active": true},
                    {"key": "C", "name": "Lightning Only", "latitude": 57.0, "longitude": 16.0, "active": true},
                ]
            })))
            .mount(&server)
            .await;

        let client = Arc::new(UpstreamClient::new(
            server.uri(),
            "test-agent".to_string(),
            std::env::temp_dir(),
        ));
        let catalog = StationCatalog::new(client);
        let mut listings = catalog.get_all().await.unwrap();
        listings.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].id, "A");
        assert!(listings[0].has_cloud_data);
        assert!(!listings[0].has_lightning_data);
        assert_eq!(listings[1].id, "B");
        assert!(listings[1].has_cloud_data);
        assert!(listings[1].has_lightning_data);
        assert_eq!(listings[2].id, "C");
        assert!(!listings[2].has_cloud_data);
        assert!(listings[2].has_lightning_data);
    }
}
