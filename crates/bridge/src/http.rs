use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use bigskies_bus::BusClient;
use bigskies_core::CoordinatorError;
use serde::Serialize;
use utoipa::ToSchema;

use crate::bridge::{AscomBridge, ExecuteRequest};

/// Error body returned to ASCOM Alpaca HTTP clients on a failed `Execute`.
#[derive(Debug, Serialize, ToSchema)]
pub struct BridgeErrorResponse {
    pub error_number: i32,
    pub error_message: String,
}

fn map_error(err: CoordinatorError) -> (StatusCode, Json<BridgeErrorResponse>) {
    let (status, error_number, error_message) = match err {
        CoordinatorError::DeviceError { code, message } => (StatusCode::UNPROCESSABLE_ENTITY, code, message),
        CoordinatorError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, -1, "device response timed out".to_string()),
        CoordinatorError::Cancelled => (StatusCode::BAD_REQUEST, -2, "request cancelled".to_string()),
        CoordinatorError::Shutdown => (StatusCode::SERVICE_UNAVAILABLE, -3, "bridge is shutting down".to_string()),
        CoordinatorError::BusUnavailable(e) => (StatusCode::BAD_GATEWAY, -4, e.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, -5, other.to_string()),
    };
    (status, Json(BridgeErrorResponse { error_number, error_message }))
}

async fn respond<B: BusClient + 'static>(
    bridge: Arc<AscomBridge<B>>,
    device_type: String,
    device_number: u32,
    method: String,
    http_method: &str,
    parameters: HashMap<String, serde_json::Value>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<BridgeErrorResponse>)> {
    bridge
        .execute(ExecuteRequest { device_type, device_number, method, http_method: http_method.to_string(), parameters })
        .await
        .map(Json)
        .map_err(map_error)
}

async fn get_device_property<B: BusClient + 'static>(
    State(bridge): State<Arc<AscomBridge<B>>>,
    Path((device_type, device_number, method)): Path<(String, u32, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<BridgeErrorResponse>)> {
    let parameters = params.into_iter().map(|(k, v)| (k, serde_json::Value::String(v))).collect();
    respond(bridge, device_type, device_number, method, "GET", parameters).await
}

async fn put_device_command<B: BusClient + 'static>(
    State(bridge): State<Arc<AscomBridge<B>>>,
    Path((device_type, device_number, method)): Path<(String, u32, String)>,
    Json(parameters): Json<HashMap<String, serde_json::Value>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<BridgeErrorResponse>)> {
    respond(bridge, device_type, device_number, method, "PUT", parameters).await
}

/// ASCOM Alpaca-style ingress: `/api/v1/{device_type}/{device_number}/{method}`.
/// GET reads a status-class property (query params become parameters);
/// PUT issues a control/config-class command (JSON body becomes
/// parameters). Routing to the mapped bus topic happens inside
/// [`AscomBridge::execute`], not here.
pub fn router<B: BusClient + 'static>(bridge: Arc<AscomBridge<B>>) -> Router {
    Router::new()
        .route(
            "/api/v1/:device_type/:device_number/:method",
            get(get_device_property::<B>).put(put_device_command::<B>),
        )
        .with_state(bridge)
}
