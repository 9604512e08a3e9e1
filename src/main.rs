pub mod api;
mod config;
mod engine;
mod providers;
mod sync;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use engine::{FleetView, PositionEngine, RoutePathCache, TidalImpactCalculator};
use providers::routing::RoutingClient;
use sync::SyncManager;

#[derive(OpenApi)]
#[openapi(
    info(title = "Majuro Transit Digital Twin API", version = "0.2.0"),
    paths(
        api::buses::get_active_buses,
        api::buses::get_bus,
        api::buses::get_trip_position,
        api::buses::get_trip_route,
        api::buses::get_trip_path,
        api::routes::get_all_routes,
        api::routes::get_route,
        api::routes::get_route_buses,
        api::routes::get_route_trips,
        api::routes::get_route_path,
        api::routes::get_route_status,
        api::stops::get_all_stops,
        api::stops::get_stop,
        api::stops::get_upcoming_arrivals,
        api::tidal::get_current_reading,
        api::tidal::get_all_impacts,
        api::tidal::get_route_impact,
        api::tidal::get_historical_readings,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::buses::TripTimelineResponse,
        api::buses::TimelineStop,
        api::buses::TripPathResponse,
        api::routes::RouteResponse,
        api::routes::TripSummary,
        api::routes::RouteStatusResponse,
        api::stops::StopResponse,
        api::stops::ArrivalResponse,
        api::tidal::CurrentReadingResponse,
        api::tidal::ImpactSummaryResponse,
        api::health::HealthResponse,
        engine::BusPosition,
        engine::BusStatus,
        engine::ImpactLevel,
        engine::InundationLevel,
        engine::RouteImpact,
        engine::RoutePathPoint,
        engine::StopRef,
        providers::tidal::TidalReading,
        providers::tidal::WaveSector,
    )),
    tags(
        (name = "buses", description = "Live bus positions and trip timelines"),
        (name = "routes", description = "Route metadata, paths and status"),
        (name = "stops", description = "Stop metadata and upcoming arrivals"),
        (name = "tidal", description = "Wave readings and route impact assessments"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    config.validate();
    tracing::info!(
        gtfs_dir = config.gtfs.data_dir,
        station = config.tidal.station_id,
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Load the static schedule into memory
    let schedule = providers::gtfs::load_schedule_index(&config.gtfs)
        .await
        .expect("Failed to load GTFS schedule");

    // Start the tidal sync manager in the background
    let sync_manager = Arc::new(
        SyncManager::new(config.tidal.clone()).expect("Failed to initialize tidal sync manager"),
    );
    let current_reading = sync_manager.reading_store();
    let historical = sync_manager.historical_store();
    let rotation = sync_manager.rotation();
    let sync_manager_clone = sync_manager.clone();
    tokio::spawn(async move {
        sync_manager_clone.start().await;
    });

    // Wire the engine
    let routing =
        RoutingClient::new(config.routing.clone()).expect("Failed to build routing client");
    let paths = Arc::new(RoutePathCache::new(schedule.clone(), routing));
    let impact = Arc::new(TidalImpactCalculator::new(current_reading.clone()));
    let position_engine = Arc::new(PositionEngine::new(
        schedule.clone(),
        paths.clone(),
        impact.clone(),
    ));
    let fleet = Arc::new(FleetView::new(schedule.clone(), position_engine.clone()));

    let state = api::TwinState {
        schedule,
        paths,
        impact,
        engine: position_engine,
        fleet,
        current_reading,
        historical,
        rotation,
        station_id: config.tidal.station_id.clone(),
        timezone: config.gtfs.parsed_timezone(),
    };

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind to port 3000");

    tracing::info!("Server running on http://localhost:3000");
    tracing::info!("Swagger UI: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Majuro Transit Digital Twin API"
}
