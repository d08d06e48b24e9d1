use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::aggregate::{daily_totals, DailyTotal, StockRow};
use crate::config::Config;
use crate::provider::{build_provider, StockProvider, StockSnapshot};

#[derive(Clone)]
struct ApiState {
    config: Config,
    provider: Arc<dyn StockProvider>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct StockTableResponse {
    refreshed_at: DateTime<Utc>,
    rows: Vec<StockRow>,
}

#[derive(Debug, Serialize)]
struct PoiResponse {
    refreshed_at: DateTime<Utc>,
    poi: StockRow,
}

#[derive(Debug, Serialize)]
struct DailySeriesResponse {
    refreshed_at: DateTime<Utc>,
    series: Vec<DailyTotal>,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    refreshed_at: DateTime<Utc>,
    input_rows: usize,
    skipped_rows: usize,
    pois: usize,
    days: usize,
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    info!(
        "refresh strategy: {} every {}s from {}",
        config.refresh.strategy,
        config.refresh.interval_secs,
        config.source.url
    );
    let provider = build_provider(config.clone());
    let state = ApiState { config, provider };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/stock/pois", get(pois))
        .route("/api/stock/pois/:code", get(poi))
        .route("/api/stock/by-day", get(by_day))
        .route("/api/stock/daily", get(daily))
        .route("/api/refresh", post(refresh))
        .route("/api/config", get(show_config))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("mask stock API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn pois(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    let snapshot = state.provider.tables().await.map_err(ApiError::internal)?;
    let data = StockTableResponse {
        refreshed_at: snapshot.refreshed_at,
        rows: snapshot.tables.most_recent.clone(),
    };
    Ok(cached_json(&state, &snapshot, &headers, data))
}

async fn poi(
    State(state): State<ApiState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    let snapshot = state.provider.tables().await.map_err(ApiError::internal)?;
    let row = snapshot
        .tables
        .poi(&code)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("no point of interest with code {code}")))?;
    let data = PoiResponse {
        refreshed_at: snapshot.refreshed_at,
        poi: row,
    };
    Ok(cached_json(&state, &snapshot, &headers, data))
}

async fn by_day(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    let snapshot = state.provider.tables().await.map_err(ApiError::internal)?;
    let data = StockTableResponse {
        refreshed_at: snapshot.refreshed_at,
        rows: snapshot.tables.by_poi_and_day.clone(),
    };
    Ok(cached_json(&state, &snapshot, &headers, data))
}

async fn daily(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    let snapshot = state.provider.tables().await.map_err(ApiError::internal)?;
    let data = DailySeriesResponse {
        refreshed_at: snapshot.refreshed_at,
        series: daily_totals(&snapshot.tables.by_poi_and_day),
    };
    Ok(cached_json(&state, &snapshot, &headers, data))
}

async fn refresh(State(state): State<ApiState>) -> ApiResult<RefreshResponse> {
    let snapshot = state.provider.refresh().await.map_err(ApiError::internal)?;
    Ok(ok(RefreshResponse {
        refreshed_at: snapshot.refreshed_at,
        input_rows: snapshot.input_rows,
        skipped_rows: snapshot.skipped_rows,
        pois: snapshot.tables.most_recent.len(),
        days: snapshot.tables.by_poi_and_day.len(),
    }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

/// Wrap a data payload with the freshness headers: `Cache-Control` bounded by
/// the refresh interval and an `ETag` from the table content hash, so a
/// browser polling the dashboard revalidates instead of re-downloading
/// unchanged tables.
fn cached_json<T: Serialize>(
    state: &ApiState,
    snapshot: &StockSnapshot,
    request_headers: &HeaderMap,
    data: T,
) -> Response {
    let etag = format!("\"{}\"", snapshot.tables.table_hash);
    let mut response = if etag_matches(request_headers, &etag) {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        ok(data).into_response()
    };

    let max_age = state.config.refresh.interval().as_secs();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={max_age}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    response
}

fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|raw| raw == "*" || raw.split(',').any(|candidate| candidate.trim() == etag))
        .unwrap_or(false)
}
