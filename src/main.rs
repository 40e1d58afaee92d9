//! Gateway binary: wires the bus, registry, rooms, and WebSocket
//! transport together and serves `/ws` and `/health`.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::HeaderValue, routing::get, Json, Router};
use http::{header, Method};
use serde_json::json;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use dispatch_hub::adapters::auth::JwtTokenVerifier;
use dispatch_hub::adapters::bus::{AnalyticsRecorder, RedisMessageBus};
use dispatch_hub::adapters::websocket::{
    websocket_router, ConnectionGate, GatewayState, NotificationRouter, RoomManager,
    SessionRegistry,
};
use dispatch_hub::config::AppConfig;
use dispatch_hub::domain::foundation::Timestamp;
use dispatch_hub::ports::{BusConnectionState, MessageBus, TokenVerifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    // Single handshake attempt; a failure starts the gateway in degraded
    // mode (REST traffic elsewhere is unaffected, real-time goes dark).
    let bus = Arc::new(
        RedisMessageBus::connect(&config.bus.url, config.bus.service_name.clone()).await,
    );
    let bus_dyn: Arc<dyn MessageBus> = bus.clone();

    let registry = Arc::new(SessionRegistry::new());
    let rooms = Arc::new(RoomManager::new());
    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtTokenVerifier::new(&config.auth.jwt_secret));
    let gate = Arc::new(ConnectionGate::new(
        verifier,
        registry.clone(),
        rooms.clone(),
    ));

    let router = NotificationRouter::new_shared(registry.clone(), rooms.clone());
    if !router.register(bus_dyn.as_ref()).await {
        tracing::warn!("notification routing disabled until bus reconnect");
    }
    let analytics = AnalyticsRecorder::new_shared();
    analytics.register(bus_dyn.as_ref()).await;

    let state = GatewayState::new(gate, registry, rooms, bus_dyn);

    let app = Router::new()
        .merge(websocket_router())
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(cors_layer(&config))
        .with_state(state);

    let addr = config.server.socket_addr()?;
    tracing::info!(%addr, bus = ?bus.state(), "dispatch hub listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bus.close().await;
    tracing::info!("dispatch hub stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let bus = match state.bus.state() {
        BusConnectionState::Connected => "connected",
        BusConnectionState::Degraded => "degraded",
    };
    Json(json!({
        "status": "OK",
        "service": "dispatch-hub",
        "timestamp": Timestamp::now().to_rfc3339(),
        "bus": bus,
        "connections": state.registry.session_count(),
    }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
