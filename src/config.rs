/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upstream_base_url: String,
    pub gazetteer_url: String,
    pub user_agent: String,
    pub port: u16,
    /// Root directory for the on-disk CSV and result caches.
    pub cache_dir: String,
    /// Max concurrent CSV fetches on the user-facing request path.
    pub prefetch_concurrency: usize,
    /// Max concurrent CSV fetches during background pre-warming.
    pub prewarm_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            upstream_base_url: std::env::var("UPSTREAM_BASE_URL").unwrap_or_else(|_| {
                "https://opendata-download-metobs.example.com/api/version/1.0".to_string()
            }),
            gazetteer_url: std::env::var("GAZETTEER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            user_agent: std::env::var("UPSTREAM_USER_AGENT").unwrap_or_else(|_| {
                "station-weather-engine/0.1".to_string()
            }),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            cache_dir: std::env::var("CACHE_DIR").unwrap_or_else(|_| "./cache".to_string()),
            prefetch_concurrency: std::env::var("PREFETCH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            prewarm_concurrency: std::env::var("PREWARM_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        unsafe {
            std::env::remove_var("UPSTREAM_BASE_URL");
            std::env::remove_var("GAZETTEER_URL");
            std::env::remove_var("UPSTREAM_USER_AGENT");
            std::env::remove_var("PORT");
            std::env::remove_var("CACHE_DIR");
            std::env::remove_var("PREFETCH_CONCURRENCY");
            std::env::remove_var("PREWARM_CONCURRENCY");
        }

        let config = AppConfig::from_env();

        assert_eq!(config.port, 8080);
        assert!(config.user_agent.contains("station-weather-engine"));
        assert_eq!(config.cache_dir, "./cache");
        assert_eq!(config.prefetch_concurrency, 3);
        assert_eq!(config.prewarm_concurrency, 4);
    }

    #[test]
    fn test_port_override() {
        unsafe {
            std::env::set_var("PORT", "9090");
        }
        let config = AppConfig::from_env();
        assert_eq!(config.port, 9090);
        unsafe {
            std::env::remove_var("PORT");
        }
    }
}
