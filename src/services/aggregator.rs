//! Bucketing of raw station observations into calendar-indexed points, with
//! Wilson-score confidence intervals for the binomial lightning rate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::upstream::{is_lightning_code, ObservationRow, MONTH_NAMES};

/// Below this many present-weather observations in a bucket, a confidence
/// interval would be too wide to be meaningful, so it is suppressed.
const MIN_CI_OBSERVATIONS: i64 = 30;

const WILSON_Z: f64 = 1.96;

/// Day count per month in a leap year (2000), used for the `day` resolution
/// so that Feb 29 is always a valid bucket.
const LEAP_YEAR_MONTH_DAYS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Day,
    Month,
    Year,
}

impl Resolution {
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some("day") => Resolution::Day,
            Some("month") => Resolution::Month,
            Some("year") => Resolution::Year,
            _ => Resolution::Month,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Day => "day",
            Resolution::Month => "month",
            Resolution::Year => "year",
        }
    }

    /// Observation count per point that counts as "well covered" for the
    /// quality grader's observation-depth factor.
    pub fn good_obs_baseline(&self) -> f64 {
        match self {
            Resolution::Day => 30.0,
            Resolution::Month => 500.0,
            Resolution::Year => 2000.0,
        }
    }
}

/// A single aggregated calendar point, already blended or ready to be.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Point {
    pub label: String,
    pub cloud_coverage_avg: Option<f64>,
    pub lightning_probability: Option<f64>,
    pub lightning_lower: Option<f64>,
    pub lightning_upper: Option<f64>,
    pub obs_count: i64,
    pub lightning_obs_count: i64,
}

#[derive(Debug, Clone, Copy, Default)]
struct WeatherBucket {
    total: i64,
    hits: i64,
}

/// Wilson 95% score interval for a binomial proportion, as percentages.
/// Returns `None` when there are no observations.
pub fn wilson_interval(successes: i64, total: i64) -> Option<(f64, f64)> {
    if total == 0 {
        return None;
    }
    let s = successes as f64;
    let n = total as f64;
    let z = WILSON_Z;
    let p = s / n;
    let d = 1.0 + z * z / n;
    let c = (p + z * z / (2.0 * n)) / d;
    let m = (z / d) * ((p * (1.0 - p) / n) + (z * z / (4.0 * n * n))).sqrt();
    let lower = (c - m).max(0.0) * 100.0;
    let upper = (c + m).min(1.0) * 100.0;
    Some((lower, upper))
}

fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (v * factor).round() / factor
}

fn make_point(
    label: String,
    cloud_values: &[f64],
    bucket: WeatherBucket,
    has_lightning_data: bool,
) -> Point {
    let cloud_coverage_avg = if cloud_values.is_empty() {
        None
    } else {
        Some(round_to(cloud_values.iter().sum::<f64>() / cloud_values.len() as f64, 1))
    };

    let (lightning_probability, lightning_lower, lightning_upper) =
        if has_lightning_data && bucket.total > 0 {
            let pct = round_to(bucket.hits as f64 / bucket.total as f64 * 100.0, 2);
            if bucket.total >= MIN_CI_OBSERVATIONS {
                let (lower, upper) = wilson_interval(bucket.hits, bucket.total).unwrap();
                (Some(pct), Some(round_to(lower, 2)), Some(round_to(upper, 2)))
            } else {
                (Some(pct), None, None)
            }
        } else {
            (None, None, None)
        };

    Point {
        label,
        cloud_coverage_avg,
        lightning_probability,
        lightning_lower,
        lightning_upper,
        obs_count: cloud_values.len() as i64,
        lightning_obs_count: bucket.total,
    }
}

fn split_date(date: &str) -> Option<(i32, u32, u32)> {
    let mut parts = date.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    Some((year, month, day))
}

/// Bucket raw rows into calendar-indexed points for the given resolution.
pub fn aggregate(
    cloud_rows: &[ObservationRow],
    weather_rows: &[ObservationRow],
    has_lightning_data: bool,
    resolution: Resolution,
) -> Vec<Point> {
    match resolution {
        Resolution::Month => aggregate_monthly(cloud_rows, weather_rows, has_lightning_data),
        Resolution::Day => aggregate_daily(cloud_rows, weather_rows, has_lightning_data),
        Resolution::Year => aggregate_yearly(cloud_rows, weather_rows, has_lightning_data),
    }
}

fn aggregate_monthly(
    cloud_rows: &[ObservationRow],
    weather_rows: &[ObservationRow],
    has_lightning_data: bool,
) -> Vec<Point> {
    let mut cloud_buckets: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for row in cloud_rows {
        if let Some((_, month, _)) = split_date(&row.date) {
            cloud_buckets.entry(month).or_default().push(row.value);
        }
    }

    let mut weather_buckets: BTreeMap<u32, WeatherBucket> = BTreeMap::new();
    for row in weather_rows {
        if let Some((_, month, _)) = split_date(&row.date) {
            let bucket = weather_buckets.entry(month).or_default();
            bucket.total += 1;
            if is_lightning_code(row.value as i64) {
                bucket.hits += 1;
            }
        }
    }

    (1..=12u32)
        .map(|m| {
            let cloud_values = cloud_buckets.get(&m).cloned().unwrap_or_default();
            let bucket = weather_buckets.get(&m).copied().unwrap_or_default();
            make_point(
                MONTH_NAMES[(m - 1) as usize].to_string(),
                &cloud_values,
                bucket,
                has_lightning_data,
            )
        })
        .collect()
}

fn aggregate_daily(
    cloud_rows: &[ObservationRow],
    weather_rows: &[ObservationRow],
    has_lightning_data: bool,
) -> Vec<Point> {
    let mut cloud_buckets: BTreeMap<(u32, u32), Vec<f64>> = BTreeMap::new();
    for row in cloud_rows {
        if let Some((_, month, day)) = split_date(&row.date) {
            cloud_buckets.entry((month, day)).or_default().push(row.value);
        }
    }

    let mut weather_buckets: BTreeMap<(u32, u32), WeatherBucket> = BTreeMap::new();
    for row in weather_rows {
        if let Some((_, month, day)) = split_date(&row.date) {
            let bucket = weather_buckets.entry((month, day)).or_default();
            bucket.total += 1;
            if is_lightning_code(row.value as i64) {
                bucket.hits += 1;
            }
        }
    }

    let mut points = Vec::with_capacity(366);
    for (idx, &days_in_month) in LEAP_YEAR_MONTH_DAYS.iter().enumerate() {
        let month = (idx + 1) as u32;
        for day in 1..=days_in_month {
            let key = (month, day);
            let cloud_values = cloud_buckets.get(&key).cloned().unwrap_or_default();
            let bucket = weather_buckets.get(&key).copied().unwrap_or_default();
            let label = format!("{} {:02}", MONTH_NAMES[(month - 1) as usize], day);
            points.push(make_point(label, &cloud_values, bucket, has_lightning_data));
        }
    }
    points
}

fn aggregate_yearly(
    cloud_rows: &[ObservationRow],
    weather_rows: &[ObservationRow],
    has_lightning_data: bool,
) -> Vec<Point> {
    let mut cloud_buckets: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for row in cloud_rows {
        if let Some((year, _, _)) = split_date(&row.date) {
            cloud_buckets.entry(year).or_default().push(row.value);
        }
    }

    let mut weather_buckets: BTreeMap<i32, WeatherBucket> = BTreeMap::new();
    for row in weather_rows {
        if let Some((year, _, _)) = split_date(&row.date) {
            let bucket = weather_buckets.entry(year).or_default();
            bucket.total += 1;
            if is_lightning_code(row.value as i64) {
                bucket.hits += 1;
            }
        }
    }

    let mut years: Vec<i32> = cloud_buckets.keys().chain(weather_buckets.keys()).copied().collect();
    years.sort_unstable();
    years.dedup();

    years
        .into_iter()
        .map(|y| {
            let cloud_values = cloud_buckets.get(&y).cloned().unwrap_or_default();
            let bucket = weather_buckets.get(&y).copied().unwrap_or_default();
            make_point(y.to_string(), &cloud_values, bucket, has_lightning_data)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, value: f64) -> ObservationRow {
        ObservationRow {
            date: date.to_string(),
            time: "00:00".to_string(),
            value,
            quality: "G".to_string(),
        }
    }

    #[test]
    fn test_wilson_suppressed_below_threshold() {
        // 1/5 = 20% but total < 30, so no CI.
        let p = make_point(
            "Jan".to_string(),
            &[],
            WeatherBucket { total: 5, hits: 1 },
            true,
        );
        assert_eq!(p.lightning_probability, Some(20.0));
        assert_eq!(p.lightning_lower, None);
        assert_eq!(p.lightning_upper, None);
    }

    #[test]
    fn test_wilson_present_above_threshold() {
        let p = make_point(
            "Jan".to_string(),
            &[],
            WeatherBucket { total: 100, hits: 5 },
            true,
        );
        assert_eq!(p.lightning_probability, Some(5.0));
        let lower = p.lightning_lower.unwrap();
        let upper = p.lightning_upper.unwrap();
        assert!(lower < 5.0 && 5.0 < upper, "lower={lower} upper={upper}");
        assert!((lower - 1.93).abs() < 0.1, "lower={lower}");
        assert!((upper - 11.3).abs() < 0.2, "upper={upper}");
    }

    #[test]
    fn test_no_lightning_data_nulls_out_fields() {
        let p = make_point(
            "Jan".to_string(),
            &[10.0],
            WeatherBucket { total: 0, hits: 0 },
            false,
        );
        assert_eq!(p.lightning_probability, None);
        assert_eq!(p.cloud_coverage_avg, Some(10.0));
    }

    #[test]
    fn test_aggregate_monthly_has_12_points() {
        let cloud = vec![row("2020-01-15", 50.0), row("2020-06-15", 80.0)];
        let points = aggregate(&cloud, &[], false, Resolution::Month);
        assert_eq!(points.len(), 12);
        assert_eq!(points[0].label, "Jan");
        assert_eq!(points[0].cloud_coverage_avg, Some(50.0));
        assert_eq!(points[5].cloud_coverage_avg, Some(80.0));
        assert_eq!(points[1].cloud_coverage_avg, None);
    }

    #[test]
    fn test_aggregate_daily_has_366_points_including_feb_29() {
        let points = aggregate(&[], &[], false, Resolution::Day);
        assert_eq!(points.len(), 366);
        assert!(points.iter().any(|p| p.label == "Feb 29"));
    }

    #[test]
    fn test_aggregate_yearly_matches_observed_years() {
        let cloud = vec![row("2019-03-01", 10.0), row("2021-03-01", 20.0)];
        let weather = vec![row("2020-03-01", 95.0)];
        let points = aggregate(&cloud, &weather, true, Resolution::Year);
        let labels: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["2019", "2020", "2021"]);
    }
}
