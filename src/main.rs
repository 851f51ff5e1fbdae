// Station Weather Engine API v0.1
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod errors;
mod routes;
mod services;

use config::AppConfig;
use routes::search::SearchState;
use routes::stations::StationsState;
use routes::weather::WeatherState;
use services::engine::LocationEngine;
use services::geocoding::GeocodingClient;
use services::result_cache::ResultCache;
use services::row_cache::RowCache;
use services::stations::StationCatalog;
use services::upstream::UpstreamClient;

/// Station Weather Engine — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Station Weather Engine API",
        version = "0.1.0",
        description = "Estimates cloud coverage and lightning probability at an arbitrary \
            location by interpolating across a national weather station network. Selects \
            nearby stations per dimension with inverse-distance weighting, aggregates their \
            historical observations into calendar buckets, and blends the result with a \
            station-coverage and historical-data quality grade.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Weather", description = "Location and station weather estimates"),
        (name = "Stations", description = "Station discovery and listing"),
        (name = "Search", description = "Address search and autocomplete"),
        (name = "Prewarmer", description = "Background cache pre-warmer status"),
    ),
    paths(
        routes::health::health_check,
        routes::weather::get_location_weather,
        routes::weather::get_station_weather,
        routes::stations::get_nearby_stations,
        routes::stations::get_all_stations,
        routes::search::search_address,
        routes::search::autocomplete_address,
        routes::prewarmer::get_prewarmer_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            services::engine::LocationResult,
            services::engine::StationResult,
            services::engine::LocationStationEntry,
            services::engine::LocationPoint,
            services::aggregator::Point,
            services::aggregator::Resolution,
            services::quality::LocationQuality,
            services::quality::QualityReport,
            services::quality::FactorReport,
            services::quality::StationCoverageReport,
            services::stations::Candidate,
            services::stations::StationListing,
            routes::search::AutocompleteResponse,
            services::geocoding::GeocodeResult,
            services::prewarmer::PrewarmStatus,
            services::prewarmer::PrewarmState,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "station_weather_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    let upstream_client = Arc::new(UpstreamClient::new(
        config.upstream_base_url.clone(),
        config.user_agent.clone(),
        config.cache_dir.clone(),
    ));
    let catalog = StationCatalog::new(upstream_client.clone());
    let row_cache = RowCache::new(upstream_client.clone());
    let result_cache = ResultCache::new(config.cache_dir.clone());
    let engine = LocationEngine::new(
        catalog.clone(),
        row_cache,
        result_cache,
        config.prefetch_concurrency,
    );
    let geocoder = GeocodingClient::new(config.gazetteer_url.clone(), config.user_agent.clone());

    // Spawn the background pre-warmer: walks the full station roster once at
    // startup so the first user requests don't pay the cold-cache penalty.
    let prewarm_status = services::prewarmer::new_status();
    services::prewarmer::start(
        upstream_client,
        engine.clone(),
        config.prewarm_concurrency,
        prewarm_status.clone(),
    );

    // CORS — read-only API, restrict methods to GET.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    let weather_routes = Router::new()
        .route("/api/location-weather", get(routes::weather::get_location_weather))
        .route("/api/weather-data/:station_id", get(routes::weather::get_station_weather))
        .with_state(WeatherState { engine });

    let station_routes = Router::new()
        .route("/api/stations", get(routes::stations::get_nearby_stations))
        .route("/api/all-stations", get(routes::stations::get_all_stations))
        .with_state(StationsState { catalog });

    let search_routes = Router::new()
        .route("/api/search", get(routes::search::search_address))
        .route("/api/autocomplete", get(routes::search::autocomplete_address))
        .with_state(SearchState { geocoder });

    let prewarmer_routes = Router::new()
        .route("/api/prewarmer/status", get(routes::prewarmer::get_prewarmer_status))
        .with_state(prewarm_status);

    let health_routes = Router::new().route("/api/health", get(routes::health::health_check));

    let app = Router::new()
        .merge(health_routes)
        .merge(weather_routes)
        .merge(station_routes)
        .merge(search_routes)
        .merge(prewarmer_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
