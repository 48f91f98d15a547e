//! Purpose: Axum router for the record relay (`/api/records`, `/health`).
//! Exports: `RelayOptions`, `router`.
//! Role: Validates and whitelists writes, forwards through a `RecordStore`, translates errors.
//! Invariants: Validation failures answer 400 before any store call.
//! Invariants: Store failures with an HTTP status are relayed with that status.
//! Invariants: Every error body is `{ "error": { "message": ..., ... } }`.
//! Invariants: No relay-side state beyond the shared store handle.

use crate::api::{Error, ErrorKind, FieldPatch, ListQuery, NewRecord, RecordStore};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone, Debug, Default)]
pub struct RelayOptions {
    /// Directory served for paths outside the API routes.
    pub static_dir: Option<PathBuf>,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
}

struct RelayState {
    store: Arc<dyn RecordStore>,
}

#[derive(Clone, Copy, Debug)]
enum Operation {
    List,
    Create,
    Update,
    Delete,
}

impl Operation {
    fn route(self) -> &'static str {
        match self {
            Operation::List => "GET /api/records",
            Operation::Create => "POST /api/records",
            Operation::Update => "PATCH /api/records/:id",
            Operation::Delete => "DELETE /api/records/:id",
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Operation::List => "Failed to list records",
            Operation::Create => "Failed to create record",
            Operation::Update => "Failed to update record",
            Operation::Delete => "Failed to delete record",
        }
    }
}

pub fn router(store: Arc<dyn RecordStore>, options: &RelayOptions) -> Result<Router, Error> {
    let state = Arc::new(RelayState { store });
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/records", get(list_records).post(create_record))
        .route(
            "/api/records/:id",
            patch(update_record).delete(delete_record),
        )
        .with_state(state);

    if let Some(dir) = &options.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    Ok(app
        .layer(cors_layer(&options.cors_origins)?)
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let mut values = Vec::with_capacity(origins.len());
    for origin in origins {
        let value = HeaderValue::from_str(origin).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid CORS origin: {origin}"))
                .with_source(err)
        })?;
        values.push(value);
    }
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    search: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
    offset: Option<String>,
}

async fn health(State(state): State<Arc<RelayState>>) -> Response {
    Json(json!({ "ok": true, "table": state.store.table() })).into_response()
}

async fn list_records(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let query = ListQuery::from_raw(
        params.search.as_deref(),
        params.page_size.as_deref(),
        params.offset.as_deref(),
    );
    match run_store(&state, move |store| store.list(&query)).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => error_response(Operation::List, err),
    }
}

async fn create_record(
    State(state): State<Arc<RelayState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let record = match json_object(body).and_then(|body| NewRecord::from_body(&body)) {
        Ok(record) => record,
        Err(err) => return error_response(Operation::Create, err),
    };
    match run_store(&state, move |store| store.create(&record)).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(err) => error_response(Operation::Create, err),
    }
}

async fn update_record(
    State(state): State<Arc<RelayState>>,
    AxumPath(id): AxumPath<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let patch = match json_object(body).and_then(|body| FieldPatch::whitelist(&body)) {
        Ok(patch) => patch,
        Err(err) => return error_response(Operation::Update, err),
    };
    match run_store(&state, move |store| store.update(&id, &patch)).await {
        Ok(updated) => (StatusCode::OK, Json(updated)).into_response(),
        Err(err) => error_response(Operation::Update, err),
    }
}

async fn delete_record(
    State(state): State<Arc<RelayState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    match run_store(&state, move |store| store.delete(&id)).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(err) => error_response(Operation::Delete, err),
    }
}

fn json_object(body: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, Error> {
    match body {
        Ok(Json(Value::Object(map))) => Ok(map),
        Ok(Json(_)) => {
            Err(Error::new(ErrorKind::Usage).with_message("request body must be a JSON object"))
        }
        Err(rejection) => Err(Error::new(ErrorKind::Usage)
            .with_message("request body must be a JSON object")
            .with_hint(rejection.body_text())),
    }
}

/// Store calls may block on network I/O, so they run off the async workers.
async fn run_store<T, F>(state: &RelayState, call: F) -> Result<T, Error>
where
    F: FnOnce(&dyn RecordStore) -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("store task failed")
                .with_source(err)
        })?
}

fn error_response(operation: Operation, err: Error) -> Response {
    if let Some(status) = err.status() {
        tracing::error!(
            route = operation.route(),
            status,
            detail = %err.detail().map(|detail| detail.to_string()).unwrap_or_default(),
            "upstream rejected request"
        );
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = relayed_error_body(operation, &err);
        return (status, Json(json!({ "error": body }))).into_response();
    }

    if err.kind() == ErrorKind::Usage {
        tracing::debug!(route = operation.route(), error = %err, "rejected invalid request");
        let message = err.message().unwrap_or("invalid request").to_string();
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": message } })),
        )
            .into_response();
    }

    tracing::error!(
        route = operation.route(),
        error = %err,
        cause = ?std::error::Error::source(&err).map(ToString::to_string),
        "upstream call failed"
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": { "message": operation.failure_message() } })),
    )
        .into_response()
}

/// Normalises the upstream payload to an object that always carries `message`.
fn relayed_error_body(operation: Operation, err: &Error) -> Value {
    let fallback = || {
        err.message()
            .unwrap_or(operation.failure_message())
            .to_string()
    };
    let Some(payload) = err.detail() else {
        return json!({ "message": fallback() });
    };
    match payload.get("error") {
        Some(Value::Object(inner)) => {
            let mut inner = inner.clone();
            if !inner.get("message").is_some_and(Value::is_string) {
                let message = inner
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(fallback);
                inner.insert("message".to_string(), json!(message));
            }
            Value::Object(inner)
        }
        Some(Value::String(code)) => json!({ "type": code, "message": code }),
        _ => json!({ "message": operation.failure_message(), "detail": payload }),
    }
}
