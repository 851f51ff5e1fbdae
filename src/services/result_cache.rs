//! Persistent per-(station, resolution) cache of aggregated results.
//!
//! Keying by resolution as well as station id is a refinement over the
//! upstream cache layer, which historically kept one file per station only;
//! two different resolutions for the same station are materially different
//! payloads and must not collide on disk.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::AppError;

const CACHE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: cache_dir.into().join("results"),
        }
    }

    fn path_for(&self, station_id: &str, resolution: &str) -> PathBuf {
        self.dir.join(format!("station_{station_id}_{resolution}.json"))
    }

    pub async fn read<T: DeserializeOwned>(
        &self,
        station_id: &str,
        resolution: &str,
    ) -> Option<T> {
        let path = self.path_for(station_id, resolution);
        let meta = tokio::fs::metadata(&path).await.ok()?;
        let modified = meta.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age >= CACHE_MAX_AGE {
            return None;
        }
        let text = tokio::fs::read_to_string(&path).await.ok()?;
        serde_json::from_str(&text).ok()
    }

    pub async fn write<T: Serialize>(
        &self,
        station_id: &str,
        resolution: &str,
        data: &T,
    ) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::InternalError(format!("failed to create result cache dir: {e}")))?;
        let path = self.path_for(station_id, resolution);
        let text = serde_json::to_string(data)
            .map_err(|e| AppError::InternalError(format!("failed to serialize cache result: {e}")))?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &text)
            .await
            .map_err(|e| AppError::InternalError(format!("failed to write result cache: {e}")))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| AppError::InternalError(format!("failed to finalize result cache: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        value: i32,
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("result-cache-test-{:?}", std::time::Instant::now()));
        let cache = ResultCache::new(dir.clone());
        let payload = Dummy { value: 42 };
        cache.write("station1", "month", &payload).await.unwrap();
        let read_back: Option<Dummy> = cache.read("station1", "month").await;
        assert_eq!(read_back, Some(payload));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn test_distinct_resolutions_do_not_collide() {
        let dir = std::env::temp_dir().join(format!("result-cache-test2-{:?}", std::time::Instant::now()));
        let cache = ResultCache::new(dir.clone());
        cache.write("station1", "month", &Dummy { value: 1 }).await.unwrap();
        cache.write("station1", "year", &Dummy { value: 2 }).await.unwrap();
        let month: Option<Dummy> = cache.read("station1", "month").await;
        let year: Option<Dummy> = cache.read("station1", "year").await;
        assert_eq!(month, Some(Dummy { value: 1 }));
        assert_eq!(year, Some(Dummy { value: 2 }));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn test_missing_entry_returns_none() {
        let dir = std::env::temp_dir().join(format!("result-cache-test3-{:?}", std::time::Instant::now()));
        let cache = ResultCache::new(dir.clone());
        let read_back: Option<Dummy> = cache.read("unknown", "month").await;
        assert_eq!(read_back, None);
    }
}
