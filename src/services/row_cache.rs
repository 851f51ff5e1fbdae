//! In-memory parsed-row cache.
//!
//! Sits in front of the on-disk CSV cache: once a CSV has been fetched and
//! parsed, the resulting rows are kept in memory for the same TTL window so
//! repeated aggregation passes (e.g. the pre-warmer walking every resolution
//! for a station) don't re-parse the same text over and over.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::services::upstream::{parse_csv, ObservationRow, UpstreamClient};

/// Matches the on-disk CSV cache's freshness window.
const ROW_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Maximum number of (parameter, station) row sets held in memory at once.
const MAX_ENTRIES: usize = 30;

type CacheKey = (u32, String);

struct Entry {
    inserted_at: Instant,
    rows: Arc<Vec<ObservationRow>>,
}

/// Bounded LRU-by-insertion-age cache of parsed observation rows.
#[derive(Clone)]
pub struct RowCache {
    client: Arc<UpstreamClient>,
    entries: Arc<Mutex<HashMap<CacheKey, Entry>>>,
}

impl RowCache {
    pub fn new(client: Arc<UpstreamClient>) -> Self {
        Self {
            client,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return parsed rows for (parameter_id, station_id), fetching and
    /// parsing the upstream CSV on a cache miss or stale entry.
    pub async fn fetch_and_parse(
        &self,
        parameter_id: u32,
        station_id: &str,
    ) -> Result<Arc<Vec<ObservationRow>>, AppError> {
        let key: CacheKey = (parameter_id, station_id.to_string());

        {
            let guard = self.entries.lock().await;
            if let Some(entry) = guard.get(&key) {
                if entry.inserted_at.elapsed() < ROW_CACHE_TTL {
                    return Ok(Arc::clone(&entry.rows));
                }
            }
        }

        let csv_text = self.client.fetch_station_csv(parameter_id, station_id).await?;
        let rows = Arc::new(parse_csv(&csv_text));

        let mut guard = self.entries.lock().await;
        if guard.len() >= MAX_ENTRIES && !guard.contains_key(&key) {
            if let Some(oldest_key) = guard
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                guard.remove(&oldest_key);
            }
        }
        guard.insert(
            key,
            Entry {
                inserted_at: Instant::now(),
                rows: Arc::clone(&rows),
            },
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_hit_avoids_refetch() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("Datum;Tid;Varde;Kvalitet\n2020-01-01;00:00;1.0;G\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = Arc::new(UpstreamClient::new(
            server.uri(),
            "test-agent".to_string(),
            std::env::temp_dir().join(format!("row-cache-test-{}", uuid_like())),
        ));
        let cache = RowCache::new(client);

        let first = cache.fetch_and_parse(16, "1").await.unwrap();
        let second = cache.fetch_and_parse(16, "1").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    fn uuid_like() -> String {
        format!("{:?}", Instant::now())
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect()
    }
}
