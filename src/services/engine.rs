//! Location-estimation engine.
//!
//! Orchestrates the station catalog, adaptive selector, row cache, result
//! cache and quality grader into the two public operations the façade needs:
//! a single station's aggregated series, and a blended estimate for an
//! arbitrary coordinate.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::services::aggregator::{self, Point, Resolution};
use crate::services::quality::{self, LocationQuality};
use crate::services::result_cache::ResultCache;
use crate::services::row_cache::RowCache;
use crate::services::stations::{select_stations, SelectedStation, StationCatalog};
use crate::services::upstream::{ObservationRow, PARAM_CLOUD_COVERAGE, PARAM_PRESENT_WEATHER};

/// A single station's aggregated series at one resolution.
#[derive(Debug, Clone, Serialize, serde::Deserialize, ToSchema)]
pub struct StationResult {
    pub station_id: String,
    pub resolution: Resolution,
    pub has_lightning_data: bool,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationStationEntry {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
    pub weight_pct: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationPoint {
    pub label: String,
    pub cloud_coverage_avg: Option<f64>,
    pub lightning_probability: Option<f64>,
    pub lightning_lower: Option<f64>,
    pub lightning_upper: Option<f64>,
    pub obs_count: i64,
    pub lightning_obs_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationResult {
    pub has_lightning_data: bool,
    pub resolution: Resolution,
    pub points: Vec<LocationPoint>,
    pub cloud_stations: Vec<LocationStationEntry>,
    pub lightning_stations: Vec<LocationStationEntry>,
    pub quality: LocationQuality,
}

#[derive(Clone)]
pub struct LocationEngine {
    catalog: StationCatalog,
    row_cache: RowCache,
    result_cache: ResultCache,
    prefetch_concurrency: usize,
}

impl LocationEngine {
    pub fn new(
        catalog: StationCatalog,
        row_cache: RowCache,
        result_cache: ResultCache,
        prefetch_concurrency: usize,
    ) -> Self {
        Self {
            catalog,
            row_cache,
            result_cache,
            prefetch_concurrency,
        }
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    /// Fetch and parse a parameter's rows for a station, treating any
    /// upstream HTTP failure (e.g. 404 for a station that doesn't record
    /// that parameter) as "no data" rather than propagating an error.
    async fn fetch_rows_lenient(&self, parameter_id: u32, station_id: &str) -> Vec<ObservationRow> {
        match self.row_cache.fetch_and_parse(parameter_id, station_id).await {
            Ok(rows) => rows.as_ref().clone(),
            Err(e) => {
                tracing::warn!(
                    "no data for parameter {} at station {}: {}",
                    parameter_id,
                    station_id,
                    e
                );
                Vec::new()
            }
        }
    }

    /// The per-station orchestrator: consult the result cache, and on a
    /// miss, fetch both parameter CSVs and aggregate.
    pub async fn get_station_weather_data(
        &self,
        station_id: &str,
        resolution: Resolution,
    ) -> StationResult {
        if let Some(cached) = self
            .result_cache
            .read::<StationResult>(station_id, resolution.as_str())
            .await
        {
            return cached;
        }

        let cloud_rows = self.fetch_rows_lenient(PARAM_CLOUD_COVERAGE, station_id).await;
        let weather_rows = self.fetch_rows_lenient(PARAM_PRESENT_WEATHER, station_id).await;
        let has_lightning_data = !weather_rows.is_empty();

        let points = aggregator::aggregate(&cloud_rows, &weather_rows, has_lightning_data, resolution);

        let result = StationResult {
            station_id: station_id.to_string(),
            resolution,
            has_lightning_data,
            points,
        };

        if let Err(e) = self.result_cache.write(station_id, resolution.as_str(), &result).await {
            tracing::warn!("failed to persist result cache for {}: {}", station_id, e);
        }

        result
    }

    /// Blend an estimate for an arbitrary coordinate at the given resolution.
    pub async fn get_location_weather(
        &self,
        lat: f64,
        lng: f64,
        resolution: Resolution,
    ) -> Result<LocationResult, AppError> {
        let cloud_candidates = self
            .catalog
            .get_nearby(lat, lng, PARAM_CLOUD_COVERAGE, StationCatalog::DEFAULT_NEARBY_COUNT)
            .await?;
        let lightning_candidates = self
            .catalog
            .get_nearby(lat, lng, PARAM_PRESENT_WEATHER, StationCatalog::DEFAULT_NEARBY_COUNT)
            .await?;

        if cloud_candidates.is_empty() {
            return Ok(empty_location_result(resolution));
        }

        let cloud_selected = select_stations(&cloud_candidates);
        let lightning_selected = select_stations(&lightning_candidates);

        let mut needed_ids: HashSet<String> = HashSet::new();
        for s in cloud_selected.iter().chain(lightning_selected.iter()) {
            needed_ids.insert(s.candidate.id.clone());
        }

        // Always fetch both the requested resolution and the yearly baseline
        // (quality is always graded against yearly data), except when they
        // coincide.
        let mut resolutions_needed = vec![resolution];
        if resolution != Resolution::Year {
            resolutions_needed.push(Resolution::Year);
        }

        let mut results: HashMap<(String, Resolution), StationResult> = HashMap::new();
        for res in resolutions_needed {
            let fetched: Vec<(String, StationResult)> = stream::iter(needed_ids.iter().cloned())
                .map(|id| {
                    let engine = self.clone();
                    async move {
                        let result = engine.get_station_weather_data(&id, res).await;
                        (id, result)
                    }
                })
                .buffer_unordered(self.prefetch_concurrency)
                .collect()
                .await;
            for (id, result) in fetched {
                results.insert((id, res), result);
            }
        }

        let cloud_entries = join_results(&cloud_selected, &results, resolution);
        if cloud_entries.is_empty() {
            return Ok(empty_location_result(resolution));
        }
        let lightning_entries = join_results(&lightning_selected, &results, resolution);

        let cloud_weighted = normalize_weights(&cloud_entries);
        let lightning_weighted = normalize_weights(&lightning_entries);

        let has_lightning_data = lightning_weighted
            .iter()
            .any(|(_, result, _)| result.has_lightning_data);

        let points = blend(&cloud_weighted, &lightning_weighted, resolution);

        let cloud_yearly_entries = join_results(&cloud_selected, &results, Resolution::Year);
        let lightning_yearly_entries = join_results(&lightning_selected, &results, Resolution::Year);
        let cloud_yearly_weighted = normalize_weights(&cloud_yearly_entries);
        let lightning_yearly_weighted = normalize_weights(&lightning_yearly_entries);
        let yearly_points = blend(&cloud_yearly_weighted, &lightning_yearly_weighted, Resolution::Year);
        let yearly_points_as_points = as_points(&yearly_points);

        let cloud_quality_stations: Vec<(SelectedStation, f64)> = cloud_weighted
            .iter()
            .map(|(s, _, w)| (s.clone(), *w))
            .collect();
        let lightning_quality_stations: Vec<(SelectedStation, f64)> = lightning_weighted
            .iter()
            .map(|(s, _, w)| (s.clone(), *w))
            .collect();

        let cloud_quality = quality::compute_quality(
            &yearly_points_as_points,
            Resolution::Year.good_obs_baseline(),
            &cloud_quality_stations,
            lat,
            lng,
            |p| p.obs_count,
            "No historical cloud coverage data available for this location.",
            "No cloud coverage stations available for this location.",
        );
        let lightning_quality = quality::compute_quality(
            &yearly_points_as_points,
            Resolution::Year.good_obs_baseline(),
            &lightning_quality_stations,
            lat,
            lng,
            |p| p.lightning_obs_count,
            "No historical lightning data available for this location.",
            "No lightning stations available for this location.",
        );
        let quality = quality::combine(cloud_quality, lightning_quality, !lightning_weighted.is_empty());

        let cloud_stations = to_station_entries(&cloud_weighted);
        let lightning_stations = to_station_entries(&lightning_weighted);

        Ok(LocationResult {
            has_lightning_data,
            resolution,
            points,
            cloud_stations,
            lightning_stations,
            quality,
        })
    }
}

/// Adapts a blended location point series into the `aggregator::Point`
/// shape the quality grader expects.
fn as_points(points: &[LocationPoint]) -> Vec<Point> {
    points
        .iter()
        .map(|p| Point {
            label: p.label.clone(),
            cloud_coverage_avg: p.cloud_coverage_avg,
            lightning_probability: p.lightning_probability,
            lightning_lower: p.lightning_lower,
            lightning_upper: p.lightning_upper,
            obs_count: p.obs_count,
            lightning_obs_count: p.lightning_obs_count,
        })
        .collect()
}

fn join_results<'a>(
    selected: &'a [SelectedStation],
    results: &'a HashMap<(String, Resolution), StationResult>,
    resolution: Resolution,
) -> Vec<(&'a SelectedStation, &'a StationResult)> {
    selected
        .iter()
        .filter_map(|s| {
            results
                .get(&(s.candidate.id.clone(), resolution))
                .map(|r| (s, r))
        })
        .collect()
}

fn normalize_weights<'a>(
    entries: &[(&'a SelectedStation, &'a StationResult)],
) -> Vec<(SelectedStation, &'a StationResult, f64)> {
    let total: f64 = entries.iter().map(|(s, _)| s.raw_weight).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    entries
        .iter()
        .map(|(s, r)| ((*s).clone(), *r, s.raw_weight / total))
        .collect()
}

fn canonical_labels(
    resolution: Resolution,
    entries: &[(SelectedStation, &StationResult, f64)],
) -> Vec<String> {
    match resolution {
        Resolution::Month | Resolution::Day => entries
            .first()
            .map(|(_, r, _)| r.points.iter().map(|p| p.label.clone()).collect())
            .unwrap_or_default(),
        Resolution::Year => {
            let mut labels: Vec<String> = entries
                .iter()
                .flat_map(|(_, r, _)| r.points.iter().map(|p| p.label.clone()))
                .collect();
            labels.sort();
            labels.dedup();
            labels
        }
    }
}

fn blend(
    cloud_entries: &[(SelectedStation, &StationResult, f64)],
    lightning_entries: &[(SelectedStation, &StationResult, f64)],
    resolution: Resolution,
) -> Vec<LocationPoint> {
    let labels = canonical_labels(resolution, cloud_entries);

    let cloud_maps: Vec<(f64, HashMap<&str, &Point>)> = cloud_entries
        .iter()
        .map(|(_, r, w)| (*w, r.points.iter().map(|p| (p.label.as_str(), p)).collect()))
        .collect();
    let lightning_maps: Vec<(f64, HashMap<&str, &Point>)> = lightning_entries
        .iter()
        .map(|(_, r, w)| (*w, r.points.iter().map(|p| (p.label.as_str(), p)).collect()))
        .collect();

    labels
        .into_iter()
        .map(|label| {
            let (cloud_coverage_avg, obs_count) = blend_field(&cloud_maps, &label, |p| {
                p.cloud_coverage_avg.map(|v| (v, p.obs_count))
            });
            let (lightning_probability, _) = blend_field(&lightning_maps, &label, |p| {
                p.lightning_probability.map(|v| (v, p.lightning_obs_count))
            });
            let (lightning_lower, _) = blend_field(&lightning_maps, &label, |p| {
                p.lightning_lower.map(|v| (v, p.lightning_obs_count))
            });
            let (lightning_upper, _) = blend_field(&lightning_maps, &label, |p| {
                p.lightning_upper.map(|v| (v, p.lightning_obs_count))
            });
            let lightning_obs_count = lightning_maps
                .iter()
                .filter_map(|(_, m)| m.get(label.as_str()))
                .map(|p| p.lightning_obs_count)
                .sum();

            LocationPoint {
                label,
                cloud_coverage_avg,
                lightning_probability,
                lightning_lower,
                lightning_upper,
                obs_count,
                lightning_obs_count,
            }
        })
        .collect()
}

/// Weighted mean of a field across entries for one label, skipping entries
/// where the field is null. Returns `(blended_value, summed_obs_count)`.
fn blend_field(
    maps: &[(f64, HashMap<&str, &Point>)],
    label: &str,
    extract: impl Fn(&Point) -> Option<(f64, i64)>,
) -> (Option<f64>, i64) {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut obs_total = 0;

    for (weight, points) in maps {
        if let Some(point) = points.get(label) {
            if let Some((value, obs_count)) = extract(point) {
                weighted_sum += weight * value;
                weight_total += weight;
                obs_total += obs_count;
            }
        }
    }

    if weight_total <= 0.0 {
        (None, 0)
    } else {
        (Some(weighted_sum / weight_total), obs_total)
    }
}

fn to_station_entries(entries: &[(SelectedStation, &StationResult, f64)]) -> Vec<LocationStationEntry> {
    entries
        .iter()
        .map(|(s, _, w)| LocationStationEntry {
            id: s.candidate.id.clone(),
            name: s.candidate.name.clone(),
            latitude: s.candidate.latitude,
            longitude: s.candidate.longitude,
            distance_km: s.candidate.distance_km,
            weight_pct: ((w * 1000.0).round()) / 10.0,
        })
        .collect()
}

fn empty_location_result(resolution: Resolution) -> LocationResult {
    let cloud_quality = quality::compute_quality(
        &[],
        Resolution::Year.good_obs_baseline(),
        &[],
        0.0,
        0.0,
        |p: &Point| p.obs_count,
        "No historical cloud coverage data available for this location.",
        "No cloud coverage stations available for this location.",
    );
    let lightning_quality = quality::compute_quality(
        &[],
        Resolution::Year.good_obs_baseline(),
        &[],
        0.0,
        0.0,
        |p: &Point| p.lightning_obs_count,
        "No historical lightning data available for this location.",
        "No lightning stations available for this location.",
    );
    LocationResult {
        has_lightning_data: false,
        resolution,
        points: Vec::new(),
        cloud_stations: Vec::new(),
        lightning_stations: Vec::new(),
        quality: quality::combine(cloud_quality, lightning_quality, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stations::Candidate;

    fn result_with_points(id: &str, has_lightning: bool, points: Vec<Point>) -> StationResult {
        StationResult {
            station_id: id.to_string(),
            resolution: Resolution::Month,
            has_lightning_data: has_lightning,
            points,
        }
    }

    fn point(label: &str, cloud: Option<f64>, lightning: Option<f64>) -> Point {
        Point {
            label: label.to_string(),
            cloud_coverage_avg: cloud,
            lightning_probability: lightning,
            lightning_lower: None,
            lightning_upper: None,
            obs_count: if cloud.is_some() { 10 } else { 0 },
            lightning_obs_count: if lightning.is_some() { 10 } else { 0 },
        }
    }

    fn selected(id: &str, raw_weight: f64) -> SelectedStation {
        SelectedStation {
            candidate: Candidate {
                id: id.to_string(),
                name: id.to_string(),
                latitude: 0.0,
                longitude: 0.0,
                distance_km: 1.0,
            },
            raw_weight,
        }
    }

    #[test]
    fn test_blend_isolation_cloud_and_lightning_independent() {
        let a = selected("a", 0.7);
        let b = selected("b", 0.3);
        let ra = result_with_points("a", true, vec![point("Jan", Some(80.0), Some(5.0))]);
        let rb = result_with_points("b", true, vec![point("Jan", Some(40.0), Some(10.0))]);

        let cloud_entries = vec![(&a, &ra), (&b, &rb)];
        let cloud_weighted = normalize_weights(&cloud_entries);

        let la = selected("a", 0.6);
        let lb = selected("b", 0.4);
        let lightning_weighted = vec![(la, &ra, 0.6), (lb, &rb, 0.4)];

        let points = blend(&cloud_weighted, &lightning_weighted, Resolution::Month);
        assert_eq!(points.len(), 1);
        assert!((points[0].cloud_coverage_avg.unwrap() - 68.0).abs() < 1e-9);
        assert!((points[0].lightning_probability.unwrap() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_weights_sums_to_one() {
        let a = selected("a", 0.7);
        let b = selected("b", 0.3);
        let ra = result_with_points("a", false, vec![]);
        let rb = result_with_points("b", false, vec![]);
        let entries = vec![(&a, &ra), (&b, &rb)];
        let weighted = normalize_weights(&entries);
        let total: f64 = weighted.iter().map(|(_, _, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_weights_respects_ratio() {
        let a = selected("a", 0.75);
        let b = selected("b", 0.25);
        let ra = result_with_points("a", false, vec![]);
        let rb = result_with_points("b", false, vec![]);
        let entries = vec![(&a, &ra), (&b, &rb)];
        let weighted = normalize_weights(&entries);
        assert!((weighted[0].2 - 0.75).abs() < 1e-9);
        assert!((weighted[1].2 - 0.25).abs() < 1e-9);
    }
}
