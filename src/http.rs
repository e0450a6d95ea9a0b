//! Read-only diagnostic HTTP surface.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::signaling::{RoomManagerHandle, RoomSummary, SignalingError};

pub const DEFAULT_HTTP_PORT: u16 = 3002;

pub fn router(handle: RoomManagerHandle) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/rooms", get(list_rooms))
        .layer(CorsLayer::permissive())
        .with_state(handle)
}

pub async fn serve(listener: TcpListener, handle: RoomManagerHandle) -> std::io::Result<()> {
    info!("Diagnostics listening on {}", listener.local_addr()?);
    axum::serve(listener, router(handle)).await
}

struct ApiError(SignalingError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Diagnostics request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rooms: usize,
    connections: usize,
}

async fn health_check(State(handle): State<RoomManagerHandle>) -> Result<Json<HealthResponse>, ApiError> {
    let stats = handle.stats().await.map_err(ApiError)?;
    Ok(Json(HealthResponse {
        status: "ok",
        rooms: stats.rooms,
        connections: stats.connections,
    }))
}

async fn list_rooms(State(handle): State<RoomManagerHandle>) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    handle.list_rooms().await.map(Json).map_err(ApiError)
}
