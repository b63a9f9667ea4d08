#![cfg(feature = "web")]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::engineers::Engineer;
use crate::projects::{ProjectPatch, normalize_contract_id};
use crate::registry::{Registry, load_registry, save_registry};
use crate::workbook;

const REGISTRY_FILE: &str = "database/registry.bin.gz";

pub struct AppState {
    registry: Mutex<Registry>,
    data_file: String,
}

#[derive(Deserialize)]
struct StorageItem {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct RoleQuery {
    role: Option<String>,
}

pub async fn run(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    run_with_data_file(port, REGISTRY_FILE).await
}

pub async fn run_with_data_file(
    port: u16,
    data_file: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    // A missing or unreadable registry never stops the server; it starts
    // empty and the failure is logged.
    let registry = match load_registry(data_file) {
        Ok(registry) => registry,
        Err(e) => {
            log::warn!("starting with an empty registry ({}): {}", data_file, e);
            Registry::default()
        }
    };

    let app_state = Arc::new(AppState {
        registry: Mutex::new(registry),
        data_file: data_file.to_string(),
    });

    let app = router(app_state);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    println!("Listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/get-projects", get(get_projects))
        .route("/api/save-project", post(save_project))
        .route("/api/update-project/:contract_id", put(update_project))
        .route("/api/delete-project/:contract_id", delete(delete_project))
        .route("/api/export-projects", get(export_projects))
        .route("/api/pow/:contract_id", get(get_pow).put(put_pow))
        .route("/api/engineers", get(get_engineers).post(post_engineer))
        .route("/api/engineers/:name", delete(delete_engineer))
        .route(
            "/api/client-storage",
            get(get_client_storage).delete(clear_client_storage),
        )
        .route("/api/client-storage/item", put(put_storage_item))
        .route("/api/client-storage/item/:key", delete(delete_storage_item))
        .route("/api/storage-status", get(storage_status))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

fn failure(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

fn persist(state: &AppState, registry: &Registry) -> Result<(), Response> {
    save_registry(registry, &state.data_file).map_err(|e| {
        log::error!("failed to persist registry: {}", e);
        failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
    })
}

async fn get_projects(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.registry.lock().unwrap();
    let rows: Vec<serde_json::Value> = registry
        .projects
        .iter()
        .filter_map(|project| serde_json::to_value(project).ok())
        .collect();
    Json(json!({ "success": true, "projects": rows }))
}

async fn save_project(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProjectPatch>,
) -> Response {
    let mut registry = state.registry.lock().unwrap();
    if let Err(e) = registry.save_project(payload.into_project()) {
        return failure(StatusCode::BAD_REQUEST, &e);
    }
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({ "success": true })).into_response()
}

async fn update_project(
    Path(contract_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProjectPatch>,
) -> Response {
    if contract_id.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Missing contractId");
    }
    let mut registry = state.registry.lock().unwrap();
    if let Err(e) = registry.update_project(&contract_id, &payload) {
        return failure(StatusCode::NOT_FOUND, &e);
    }
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({ "success": true })).into_response()
}

async fn delete_project(
    Path(contract_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let mut registry = state.registry.lock().unwrap();
    if !registry.delete_project(&contract_id) {
        return failure(StatusCode::NOT_FOUND, "Project not found");
    }
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({ "success": true })).into_response()
}

async fn export_projects(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.registry.lock().unwrap();
    match workbook::to_xlsx(&registry.projects) {
        Ok(buffer) => Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            )
            .body(axum::body::Body::from(buffer))
            .unwrap(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn get_pow(Path(contract_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let contract_id = normalize_contract_id(&contract_id);
    if contract_id.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Missing contractId.");
    }
    let registry = state.registry.lock().unwrap();
    let record = registry.pow_record(&contract_id);
    Json(json!({
        "success": true,
        "contractId": contract_id,
        "programWorks": record.program_works,
        "variationOrders": record.variation_orders,
        "updatedAt": record.updated_at,
    }))
    .into_response()
}

async fn put_pow(
    Path(contract_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let contract_id = normalize_contract_id(&contract_id);
    if contract_id.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Missing contractId.");
    }
    let mut registry = state.registry.lock().unwrap();
    let record = match registry.set_pow_record(&contract_id, &payload) {
        Some(record) => record,
        None => return failure(StatusCode::BAD_REQUEST, "Missing contractId."),
    };
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({
        "success": true,
        "contractId": contract_id,
        "programWorks": record.program_works,
        "variationOrders": record.variation_orders,
        "updatedAt": record.updated_at,
    }))
    .into_response()
}

async fn get_engineers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.registry.lock().unwrap();
    Json(json!({ "success": true, "engineers": registry.engineers }))
}

async fn post_engineer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Engineer>,
) -> Response {
    let mut registry = state.registry.lock().unwrap();
    if let Err(e) = registry.upsert_engineer(payload) {
        return failure(StatusCode::BAD_REQUEST, &e);
    }
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({
        "success": true,
        "engineers": registry.engineers,
        "total": registry.engineers.len(),
    }))
    .into_response()
}

async fn delete_engineer(
    Path(name): Path<String>,
    Query(query): Query<RoleQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let name = name.trim().to_string();
    if name.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Engineer name is required.");
    }
    let role = query
        .role
        .as_deref()
        .map(str::trim)
        .filter(|role| !role.is_empty());
    let mut registry = state.registry.lock().unwrap();
    if !registry.remove_engineer(&name, role) {
        return failure(StatusCode::NOT_FOUND, "Engineer not found.");
    }
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({
        "success": true,
        "engineers": registry.engineers,
        "total": registry.engineers.len(),
    }))
    .into_response()
}

async fn get_client_storage(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.registry.lock().unwrap();
    Json(json!({ "success": true, "data": registry.storage_snapshot() }))
}

async fn put_storage_item(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StorageItem>,
) -> Response {
    let mut registry = state.registry.lock().unwrap();
    if !registry.set_storage_item(&payload.key, &payload.value) {
        return failure(StatusCode::BAD_REQUEST, "Missing key.");
    }
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({ "success": true })).into_response()
}

async fn delete_storage_item(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let mut registry = state.registry.lock().unwrap();
    // deleting an absent key is a no-op, not an error
    registry.remove_storage_item(&key);
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({ "success": true })).into_response()
}

async fn clear_client_storage(State(state): State<Arc<AppState>>) -> Response {
    let mut registry = state.registry.lock().unwrap();
    registry.clear_storage();
    if let Err(response) = persist(&state, &registry) {
        return response;
    }
    Json(json!({ "success": true })).into_response()
}

async fn storage_status() -> impl IntoResponse {
    // document/photo object storage runs as a separate service; this
    // deployment reports it absent
    Json(json!({
        "success": true,
        "wasabiConfigured": false,
        "bucket": "",
        "region": "",
        "publicUrl": "",
    }))
}
