pub mod aggregator;
pub mod engine;
pub mod geocoding;
pub mod prewarmer;
pub mod quality;
pub mod result_cache;
pub mod row_cache;
pub mod stations;
pub mod upstream;
