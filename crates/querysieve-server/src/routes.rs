use crate::error::AppError;
use crate::state::{AppState, ID_PARAM};
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use querysieve_core::ParameterBag;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::debug;

/// Header naming the requesting principal, used for owner scoping.
pub const PRINCIPAL_HEADER: &str = "x-principal";

fn principal(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, app.metrics.render())
}

pub async fn list(
    State(app): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, AppError> {
    let seed = app.resource(&resource)?;
    let params = ParameterBag::new(params);
    let query = seed.resource.filtered(
        app.store.query(&seed.kind)?,
        &params,
        &BTreeMap::new(),
        principal(&headers),
        &app.registry,
    )?;
    let records = query.all()?;
    app.metrics.filter_passes.with_label_values(&[&resource]).inc();
    debug!(resource = %resource, count = records.len(), "list served");
    Ok(Json(json!({"count": records.len(), "results": records})))
}

pub async fn detail(
    State(app): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, AppError> {
    let seed = app.resource(&resource)?;
    let params = ParameterBag::new(params);
    let param = seed.resource.lookup_param().unwrap_or(ID_PARAM);
    let path_params = BTreeMap::from([(param.to_string(), id)]);
    let record = seed.resource.object(
        app.store.query(&seed.kind)?,
        &params,
        &path_params,
        principal(&headers),
        &app.registry,
    )?;
    Ok(Json(record.body))
}

/// Records latency and error statuses for every request.
pub async fn track(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let t0 = Instant::now();
    let resp = next.run(req).await;
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        app.metrics
            .error_responses
            .with_label_values(&[status.as_str()])
            .inc();
    }
    app.metrics
        .request_seconds
        .with_label_values(&[&method])
        .observe(t0.elapsed().as_secs_f64());
    resp
}
