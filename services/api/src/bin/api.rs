//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{AnonIdentityAdapter, DbAdapter, MemoryRealtimeAdapter},
    config::Config,
    error::ApiError,
    web::{generate_code_handler, rest::ApiDoc, state::AppState, ws_handler},
};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use dechat_core::codegen::CodeGenerator;
use dechat_core::messages::MessageChannel;
use dechat_core::ports::{DocumentStore, IdentityService, RealtimeStore};
use dechat_core::presence::PresenceTracker;
use dechat_core::registry::RoomRegistry;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = DbAdapter::new(db_pool);
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters & Core Services ---
    let documents: Arc<dyn DocumentStore> = Arc::new(db_adapter);
    let realtime: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtimeAdapter::new());
    let identity: Arc<dyn IdentityService> = Arc::new(AnonIdentityAdapter::new());

    let registry = Arc::new(RoomRegistry::new(documents.clone(), identity.clone()));
    let codegen = Arc::new(CodeGenerator::new(
        documents.clone(),
        config.code_max_attempts,
    ));
    let presence = Arc::new(PresenceTracker::new(realtime.clone()));
    let messages = Arc::new(MessageChannel::new(realtime.clone(), config.message_window));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        registry,
        codegen,
        presence,
        messages,
        identity,
    });

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/generate-code", get(generate_code_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
