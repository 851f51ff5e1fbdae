//! Upstream station-network client.
//!
//! Handles all HTTP communication with the national weather network's open
//! data API: station rosters and per-station historical CSV archives. No
//! aggregation or blending logic lives here.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;

use crate::errors::AppError;

/// Parameter id for total cloud coverage (%).
pub const PARAM_CLOUD_COVERAGE: u32 = 16;
/// Parameter id for present-weather WMO codes.
pub const PARAM_PRESENT_WEATHER: u32 = 13;

/// WMO present-weather codes that indicate lightning or thunder.
pub const LIGHTNING_CODES: &[u32] = &[
    13, 17, 29, 91, 92, 93, 94, 95, 96, 97, 98, 99, 112, 126, 190, 191, 192, 193, 194, 195, 196,
    213, 217, 292, 293,
];

pub fn is_lightning_code(code: i64) -> bool {
    LIGHTNING_CODES.iter().any(|&c| c as i64 == code)
}

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// The corrected-archive data update cadence is roughly monthly; 7 days is a
/// safe middle ground between staleness and hammering the upstream API.
const CACHE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const CATALOG_TIMEOUT_SECS: u64 = 15;
const CSV_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct RawStation {
    pub key: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct StationListResponse {
    #[serde(default)]
    station: Vec<RawStation>,
}

/// A single parsed observation row.
#[derive(Debug, Clone)]
pub struct ObservationRow {
    pub date: String,
    pub time: String,
    pub value: f64,
    pub quality: String,
}

/// Client for the upstream station network's open-data API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
}

impl UpstreamClient {
    pub fn new(base_url: String, user_agent: String, cache_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url,
            cache_dir: cache_dir.into(),
        }
    }

    /// Fetch all stations for a given parameter.
    pub async fn fetch_station_list(&self, parameter_id: u32) -> Result<Vec<RawStation>, AppError> {
        let url = format!("{}/parameter/{}.json", self.base_url, parameter_id);
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(CATALOG_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("station catalog fetch failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::ExternalServiceError(format!("station catalog returned an error: {e}")))?;

        let parsed: StationListResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("station catalog parse failed: {e}")))?;
        Ok(parsed.station)
    }

    /// Download the corrected-archive CSV for a parameter/station pair,
    /// serving from the on-disk cache when it is fresh.
    pub async fn fetch_station_csv(
        &self,
        parameter_id: u32,
        station_id: &str,
    ) -> Result<String, AppError> {
        let csv_dir = self.cache_dir.join("csv");
        tokio::fs::create_dir_all(&csv_dir)
            .await
            .map_err(|e| AppError::InternalError(format!("failed to create csv cache dir: {e}")))?;
        let cache_file = csv_dir.join(format!("param{parameter_id}_station{station_id}.csv"));

        if is_cache_fresh(&cache_file).await {
            if let Ok(text) = tokio::fs::read_to_string(&cache_file).await {
                return Ok(text);
            }
        }

        let url = format!(
            "{}/parameter/{}/station/{}/period/corrected-archive/data.csv",
            self.base_url, parameter_id, station_id
        );
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(CSV_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("csv fetch failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::ExternalServiceError(format!("csv endpoint returned an error: {e}")))?;

        let text = resp
            .text()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("csv body read failed: {e}")))?;

        if let Err(e) = tokio::fs::write(&cache_file, &text).await {
            tracing::warn!("failed to write csv cache file {:?}: {}", cache_file, e);
        }

        Ok(text)
    }
}

async fn is_cache_fresh(path: &Path) -> bool {
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => return false,
    };
    let modified = match meta.modified() {
        Ok(m) => m,
        Err(_) => return false,
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < CACHE_MAX_AGE,
        Err(_) => true,
    }
}

/// Parse semicolon-delimited CSV, skipping the variable-length header block.
///
/// The data header is the first line starting with `Datum;Tid`; everything
/// before it is metadata. Rows with an empty date/value or a non-numeric
/// value are dropped.
pub fn parse_csv(csv_text: &str) -> Vec<ObservationRow> {
    let lines: Vec<&str> = csv_text.lines().collect();

    let data_start = match lines.iter().position(|line| line.starts_with("Datum;Tid")) {
        Some(i) => i,
        None => return Vec::new(),
    };

    let mut rows = Vec::new();
    // Skip the header row itself.
    for line in lines.iter().skip(data_start + 1) {
        let cols: Vec<&str> = line.split(';').collect();
        if cols.len() < 4 {
            continue;
        }
        let date = cols[0].trim();
        let time = cols[1].trim();
        let value_str = cols[2].trim();
        let quality = cols[3].trim();

        if date.is_empty() || value_str.is_empty() {
            continue;
        }
        let value: f64 = match value_str.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };

        rows.push(ObservationRow {
            date: date.to_string(),
            time: time.to_string(),
            value,
            quality: quality.to_string(),
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_skips_header_block() {
        let text = "Stationsnamn;Stockholm\nÖvrig metadata;foo\n\nDatum;Tid (UTC);Värde;Kvalitet\n2020-01-01;00:00:00;45.0;G\n2020-01-02;00:00:00;12.0;G\n";
        let rows = parse_csv(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2020-01-01");
        assert_eq!(rows[0].value, 45.0);
    }

    #[test]
    fn test_parse_csv_drops_malformed_rows() {
        let text = "Datum;Tid (UTC);Värde;Kvalitet\n;00:00:00;45.0;G\n2020-01-01;00:00:00;;G\n2020-01-01;00:00:00;not-a-number;G\n2020-01-03;00:00:00;5.0;G\n";
        let rows = parse_csv(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2020-01-03");
    }

    #[test]
    fn test_parse_csv_no_header_returns_empty() {
        let rows = parse_csv("just some metadata\nno data header here\n");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_is_lightning_code() {
        assert!(is_lightning_code(95));
        assert!(is_lightning_code(213));
        assert!(!is_lightning_code(1));
        assert!(!is_lightning_code(100));
    }
}
