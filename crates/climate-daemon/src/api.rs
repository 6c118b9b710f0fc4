//! HTTP control surface

use crate::runtime::EngineHandle;
use crate::websocket;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use climate_engine::{ClimateError, Scene, TemperatureSetting};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn unavailable(e: &anyhow::Error) -> ApiResult {
    tracing::error!("Climate engine request failed: {}", e);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::error(e.to_string())),
    )
}

fn rejected(e: &ClimateError) -> ApiResult {
    let status = match e {
        ClimateError::UnknownRoom(_) | ClimateError::UnknownDevice(_) => StatusCode::NOT_FOUND,
        ClimateError::InvalidScene(_)
        | ClimateError::InvalidSetting(_)
        | ClimateError::InvalidTimeFormat(_) => StatusCode::BAD_REQUEST,
        ClimateError::Io(_) | ClimateError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

#[derive(Deserialize)]
struct ClimateControlRequest {
    enabled: bool,
}

#[derive(Deserialize)]
struct AirconRequest {
    on: bool,
}

#[derive(Deserialize)]
struct SceneRequest {
    scene: String,
    #[serde(default)]
    previous: Option<String>,
}

#[derive(Deserialize)]
struct RoomQuery {
    #[serde(default)]
    delay: i64,
}

#[derive(Deserialize)]
struct TemperatureRequest {
    setting: TemperatureSetting,
    value: f64,
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Current climate state
async fn climate_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.status().await {
        Ok(status) => ok(status),
        Err(e) => unavailable(&e),
    }
}

/// Current configuration
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.config().await {
        Ok(config) => ok(config),
        Err(e) => unavailable(&e),
    }
}

/// Enable or disable automatic climate control
async fn set_climate_control(
    State(state): State<AppState>,
    Json(req): Json<ClimateControlRequest>,
) -> impl IntoResponse {
    match state.engine.set_climate_control(req.enabled).await {
        Ok(status) => ok(status),
        Err(e) => unavailable(&e),
    }
}

/// Switch the aircon on or off by hand
async fn set_aircon(
    State(state): State<AppState>,
    Json(req): Json<AirconRequest>,
) -> impl IntoResponse {
    match state.engine.set_aircon(req.on).await {
        Ok(status) => ok(status),
        Err(e) => unavailable(&e),
    }
}

/// Move to a new scene
async fn transition_scene(
    State(state): State<AppState>,
    Json(req): Json<SceneRequest>,
) -> impl IntoResponse {
    let scene = match req.scene.parse::<Scene>() {
        Ok(scene) => scene,
        Err(e) => return rejected(&e),
    };
    let previous = match req.previous.as_deref().map(str::parse::<Scene>).transpose() {
        Ok(previous) => previous,
        Err(e) => return rejected(&e),
    };
    match state.engine.transition_scene(scene, previous).await {
        Ok(status) => ok(status),
        Err(e) => unavailable(&e),
    }
}

/// Re-derive everything from current platform state
async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.reset().await {
        Ok(status) => ok(status),
        Err(e) => unavailable(&e),
    }
}

/// Room occupancy
async fn get_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<RoomQuery>,
) -> impl IntoResponse {
    match state.engine.room(room, query.delay).await {
        Ok(Ok(room)) => ok(room),
        Ok(Err(e)) => rejected(&e),
        Err(e) => unavailable(&e),
    }
}

/// Change one temperature setting
async fn update_temperature(
    State(state): State<AppState>,
    Json(req): Json<TemperatureRequest>,
) -> impl IntoResponse {
    match state.engine.update_temperature(req.setting, req.value).await {
        Ok(Ok(update)) => ok(update),
        Ok(Err(e)) => rejected(&e),
        Err(e) => unavailable(&e),
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/climate", get(climate_status))
        .route("/api/v1/climate/control", put(set_climate_control))
        .route("/api/v1/climate/aircon", put(set_aircon))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/scene", post(transition_scene))
        .route("/api/v1/reset", post(reset))
        .route("/api/v1/rooms/:room", get(get_room))
        .route("/api/v1/settings/temperatures", put(update_temperature))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
