//! Data quality assessment for location-based weather estimates.
//!
//! Uses a report-card model: two independent factors are each graded
//! good / fair / poor, and a dimension's level equals its worst factor.
//! Two dimensions (cloud, lightning) are graded independently; the overall
//! location quality is the worst of the two, with one exception: a location
//! with no lightning stations at all should not drag the grade down to the
//! same floor as genuinely poor lightning data.

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::aggregator::Point;
use crate::services::stations::SelectedStation;

const COVERAGE_GOOD: f64 = 90.0;
const COVERAGE_FAIR: f64 = 60.0;
const DEPTH_GOOD: f64 = 70.0;
const DEPTH_FAIR: f64 = 40.0;
const PROX_GOOD_KM: f64 = 25.0;
const PROX_FAIR_KM: f64 = 75.0;
const DIR_GOOD_DEG: f64 = 180.0;
const DIR_FAIR_DEG: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Poor,
    Fair,
    Good,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Poor => "poor",
            Level::Fair => "fair",
            Level::Good => "good",
        }
    }

    fn promote(&self) -> Level {
        match self {
            Level::Poor => Level::Fair,
            Level::Fair | Level::Good => Level::Good,
        }
    }
}

/// The overall, low/medium/high mapped level used at the report's top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OverallLevel {
    Low,
    Medium,
    High,
}

impl OverallLevel {
    fn as_str(&self) -> &'static str {
        match self {
            OverallLevel::Low => "low",
            OverallLevel::Medium => "medium",
            OverallLevel::High => "high",
        }
    }
}

fn map_overall(level: Level) -> OverallLevel {
    match level {
        Level::Poor => OverallLevel::Low,
        Level::Fair => OverallLevel::Medium,
        Level::Good => OverallLevel::High,
    }
}

fn classify(value: f64, good_thresh: f64, fair_thresh: f64, higher_is_better: bool) -> Level {
    if higher_is_better {
        if value >= good_thresh {
            Level::Good
        } else if value >= fair_thresh {
            Level::Fair
        } else {
            Level::Poor
        }
    } else if value <= good_thresh {
        Level::Good
    } else if value <= fair_thresh {
        Level::Fair
    } else {
        Level::Poor
    }
}

/// Compass bearing (0-360) from point 1 to point 2.
fn bearing(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let x = d_lng.sin() * lat2_r.cos();
    let y = lat1_r.cos() * lat2_r.sin() - lat1_r.sin() * lat2_r.cos() * d_lng.cos();
    let b = x.atan2(y).to_degrees();
    ((b % 360.0) + 360.0) % 360.0
}

/// Minimum arc (degrees) containing all bearings; 0 for 0-1 bearings.
fn angular_spread(bearings: &[f64]) -> f64 {
    if bearings.len() <= 1 {
        return 0.0;
    }
    let mut sorted: Vec<f64> = bearings.iter().map(|b| ((b % 360.0) + 360.0) % 360.0).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut max_gap = 0.0f64;
    for w in sorted.windows(2) {
        let gap = w[1] - w[0];
        if gap > max_gap {
            max_gap = gap;
        }
    }
    let wrap_gap = (360.0 - sorted[sorted.len() - 1]) + sorted[0];
    if wrap_gap > max_gap {
        max_gap = wrap_gap;
    }
    ((360.0 - max_gap) * 10.0).round() / 10.0
}

const COMPASS_NAMES: [&str; 16] = [
    "north",
    "north-northeast",
    "northeast",
    "east-northeast",
    "east",
    "east-southeast",
    "southeast",
    "south-southeast",
    "south",
    "south-southwest",
    "southwest",
    "west-southwest",
    "west",
    "west-northwest",
    "northwest",
    "north-northwest",
];

fn compass_direction(bearing_deg: f64) -> &'static str {
    let idx = ((bearing_deg / 22.5).round() as i64).rem_euclid(16) as usize;
    COMPASS_NAMES[idx]
}

fn weighted_mean_bearing(bearings: &[f64], weights: &[f64]) -> f64 {
    let sin_sum: f64 = bearings
        .iter()
        .zip(weights)
        .map(|(b, w)| w * b.to_radians().sin())
        .sum();
    let cos_sum: f64 = bearings
        .iter()
        .zip(weights)
        .map(|(b, w)| w * b.to_radians().cos())
        .sum();
    let b = sin_sum.atan2(cos_sum).to_degrees();
    ((b % 360.0) + 360.0) % 360.0
}

fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (v * factor).round() / factor
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FactorReport {
    pub value: f64,
    pub level: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StationCoverageReport {
    pub value: f64,
    pub level: String,
    pub avg_km: Option<f64>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QualityReport {
    pub level: String,
    pub historical_data: FactorReport,
    pub station_coverage: StationCoverageReport,
}

fn empty_report(no_data_summary: &str, no_stations_summary: &str) -> QualityReport {
    QualityReport {
        level: "low".to_string(),
        historical_data: FactorReport {
            value: 0.0,
            level: "poor".to_string(),
            summary: no_data_summary.to_string(),
        },
        station_coverage: StationCoverageReport {
            value: 0.0,
            level: "poor".to_string(),
            avg_km: None,
            summary: no_stations_summary.to_string(),
        },
    }
}

fn build_station_summary(
    prox_level: Level,
    dir_level: Level,
    max_weight: f64,
    top_name: &str,
    bearings: &[f64],
    weights: &[f64],
) -> String {
    let mut parts = Vec::new();

    if max_weight >= 0.85 {
        parts.push(format!(
            "Estimates are based almost entirely on the nearby {top_name} station, so the data is highly representative of this location."
        ));
    } else {
        match prox_level {
            Level::Good => parts.push(
                "There are weather stations close to this location, giving a reliable estimate."
                    .to_string(),
            ),
            Level::Fair => parts.push(
                "The nearest weather stations are at a moderate distance. Estimates are reasonable but may not capture very local conditions."
                    .to_string(),
            ),
            Level::Poor => parts.push(
                "There are no nearby weather stations, so the estimates are computed from stations that are far away."
                    .to_string(),
            ),
        }
    }

    if max_weight < 0.85 && matches!(dir_level, Level::Poor | Level::Fair) {
        let avg_bearing = weighted_mean_bearing(bearings, weights);
        let direction_name = compass_direction(avg_bearing);
        if dir_level == Level::Poor {
            parts.push(format!(
                "These stations are all to the {direction_name} of the location, so the estimate may not reflect conditions in other directions."
            ));
        } else {
            parts.push(format!(
                "Most stations are to the {direction_name}, which gives partial but not full surrounding coverage."
            ));
        }
    }

    parts.join(" ")
}

fn build_data_summary(coverage_pct: f64, coverage_level: Level, depth_level: Level) -> String {
    let mut parts = Vec::new();

    if coverage_pct == 100.0 {
        parts.push("Every time period on the chart has real observations.".to_string());
    } else {
        match coverage_level {
            Level::Good => parts.push(
                "Nearly all time periods have observations, with a few small gaps filled in by estimates."
                    .to_string(),
            ),
            Level::Fair => parts.push(
                "Some time periods are missing observations and have been filled in with estimates."
                    .to_string(),
            ),
            Level::Poor => parts.push(
                "There are significant gaps in the historical record for this area.".to_string(),
            ),
        }
    }

    match depth_level {
        Level::Good => parts.push(
            "The data spans many years of consistent readings, giving reliable averages."
                .to_string(),
        ),
        Level::Fair => parts.push(
            "The amount of data behind each average is moderate — enough to be useful, but not as precise as well-covered areas."
                .to_string(),
        ),
        Level::Poor => parts.push(
            "The number of individual readings is low, so the averages may be less precise."
                .to_string(),
        ),
    }

    parts.join(" ")
}

/// Compute a report-card quality assessment for one dimension (cloud or
/// lightning): its blended points, the stations that contributed to them
/// with their normalized weights, and the query location.
pub fn compute_quality(
    points: &[Point],
    resolution_baseline: f64,
    stations: &[(SelectedStation, f64)],
    target_lat: f64,
    target_lng: f64,
    obs_count_of: impl Fn(&Point) -> i64,
    no_data_summary: &str,
    no_stations_summary: &str,
) -> QualityReport {
    if points.is_empty() || stations.is_empty() {
        return empty_report(no_data_summary, no_stations_summary);
    }

    let total_pts = points.len() as f64;
    let obs_counts: Vec<i64> = points.iter().map(&obs_count_of).collect();

    let coverage_val = round_to(
        obs_counts.iter().filter(|&&o| o > 0).count() as f64 / total_pts * 100.0,
        1,
    );
    let coverage_level = classify(coverage_val, COVERAGE_GOOD, COVERAGE_FAIR, true);

    let per_point: Vec<f64> = obs_counts
        .iter()
        .map(|&o| (o as f64 / resolution_baseline).min(1.0))
        .collect();
    let depth_val = round_to(per_point.iter().sum::<f64>() / total_pts * 100.0, 1);
    let depth_level = classify(depth_val, DEPTH_GOOD, DEPTH_FAIR, true);

    let hd_level = coverage_level.min(depth_level);
    let hd_val = round_to((coverage_val + depth_val) / 2.0, 1);

    let avg_dist: f64 = stations
        .iter()
        .map(|(s, w)| s.candidate.distance_km * w)
        .sum();
    let avg_km = round_to(avg_dist, 1);
    let prox_val = (1.0 - avg_dist.min(200.0) / 200.0) * 100.0;
    let prox_val = prox_val.clamp(0.0, 100.0);
    let prox_val = round_to(prox_val, 1);
    let prox_level = classify(avg_dist, PROX_GOOD_KM, PROX_FAIR_KM, false);

    let bearings: Vec<f64> = stations
        .iter()
        .map(|(s, _)| bearing(target_lat, target_lng, s.candidate.latitude, s.candidate.longitude))
        .collect();
    let spread = angular_spread(&bearings);
    let dir_val = round_to((spread / 360.0).min(1.0) * 100.0, 1);
    let dir_level = classify(spread, DIR_GOOD_DEG, DIR_FAIR_DEG, true);

    let max_weight = stations.iter().map(|(_, w)| *w).fold(0.0f64, f64::max);
    let effective_dir = if max_weight >= 0.85 {
        Level::Good
    } else if max_weight >= 0.60 {
        dir_level.promote()
    } else {
        dir_level
    };

    let sc_level = prox_level.min(effective_dir);
    let sc_val = if effective_dir == Level::Good && dir_level != Level::Good {
        prox_val
    } else {
        round_to((prox_val + dir_val) / 2.0, 1)
    };

    let overall = map_overall(hd_level.min(sc_level));

    let weights: Vec<f64> = stations.iter().map(|(_, w)| *w).collect();
    let (top_name, _) = stations
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(s, w)| (s.candidate.name.as_str(), *w))
        .unwrap();

    let station_summary =
        build_station_summary(prox_level, dir_level, max_weight, top_name, &bearings, &weights);
    let data_summary = build_data_summary(coverage_val, coverage_level, depth_level);

    QualityReport {
        level: overall.as_str().to_string(),
        historical_data: FactorReport {
            value: hd_val,
            level: hd_level.as_str().to_string(),
            summary: data_summary,
        },
        station_coverage: StationCoverageReport {
            value: sc_val,
            level: sc_level.as_str().to_string(),
            avg_km: Some(avg_km),
            summary: station_summary,
        },
    }
}

/// The full per-location quality block: both dimensions plus a combined
/// overall grade.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationQuality {
    pub level: String,
    pub cloud: QualityReport,
    pub lightning: QualityReport,
}

/// Combine two independently-graded dimensions into one location-level
/// quality block. A location with no lightning stations at all is not
/// punished to the same floor as one with genuinely poor lightning data.
pub fn combine(cloud: QualityReport, lightning: QualityReport, lightning_has_stations: bool) -> LocationQuality {
    let cloud_order = match cloud.level.as_str() {
        "high" => OverallLevel::High,
        "medium" => OverallLevel::Medium,
        _ => OverallLevel::Low,
    };
    let lightning_order = if !lightning_has_stations {
        OverallLevel::Medium
    } else {
        match lightning.level.as_str() {
            "high" => OverallLevel::High,
            "medium" => OverallLevel::Medium,
            _ => OverallLevel::Low,
        }
    };
    let overall = cloud_order.min(lightning_order);

    LocationQuality {
        level: overall.as_str().to_string(),
        cloud,
        lightning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stations::Candidate;

    fn station(name: &str, distance_km: f64, lat: f64, lng: f64) -> SelectedStation {
        SelectedStation {
            candidate: Candidate {
                id: name.to_string(),
                name: name.to_string(),
                latitude: lat,
                longitude: lng,
                distance_km,
            },
            raw_weight: 1.0,
        }
    }

    fn point(obs_count: i64) -> Point {
        Point {
            label: "x".to_string(),
            cloud_coverage_avg: Some(50.0),
            lightning_probability: None,
            lightning_lower: None,
            lightning_upper: None,
            obs_count,
            lightning_obs_count: 0,
        }
    }

    #[test]
    fn test_empty_stations_yields_low_poor() {
        let report = compute_quality(&[], 500.0, &[], 59.0, 18.0, |p| p.obs_count, "no data", "no stations");
        assert_eq!(report.level, "low");
        assert_eq!(report.historical_data.level, "poor");
        assert_eq!(report.station_coverage.level, "poor");
    }

    #[test]
    fn test_dominant_station_override_forces_good_direction() {
        let points = vec![point(500); 12];
        let stations = vec![
            (station("Main", 5.0, 59.0, 18.0), 0.95),
            (station("Secondary", 5.0, 59.1, 18.2), 0.05),
        ];
        let report = compute_quality(&points, 500.0, &stations, 59.0, 18.0, |p| p.obs_count, "no data", "no stations");
        assert_eq!(report.station_coverage.level, "good");
    }

    #[test]
    fn test_poor_coverage_when_far_and_scattered() {
        let points = vec![point(1); 12];
        let stations = vec![
            (station("Far1", 150.0, 59.0, 18.0), 0.5),
            (station("Far2", 180.0, 40.0, -70.0), 0.5),
        ];
        let report = compute_quality(&points, 500.0, &stations, 59.0, 18.0, |p| p.obs_count, "no data", "no stations");
        assert_eq!(report.station_coverage.level, "poor");
    }

    #[test]
    fn test_combine_caps_at_medium_without_lightning_stations() {
        let cloud = compute_quality(
            &vec![point(500); 12],
            500.0,
            &[(station("Main", 5.0, 59.0, 18.0), 1.0)],
            59.0,
            18.0,
            |p| p.obs_count,
            "no data",
            "no stations",
        );
        assert_eq!(cloud.level, "high");
        let lightning = empty_report("no lightning data", "no lightning stations");
        let combined = combine(cloud, lightning, false);
        assert_eq!(combined.level, "medium");
    }
}
