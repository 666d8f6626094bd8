use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::location::{Commune, LocationResolver, Region, Selection};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

/// Resolver calls block on the DPA API; keep them off the async workers.
async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&LocationResolver) -> T + Send + 'static,
{
    let resolver = state.resolver.clone();
    tokio::task::spawn_blocking(move || f(&resolver))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("lookup task failed: {}", e)))
}

fn log_request(path: &str, detail: &str, count: usize, start: Instant) {
    log::info!(
        "[{}] GET {}{} -> {} entries ({:.1}ms)",
        Utc::now().format("%H:%M:%S"),
        path,
        detail,
        count,
        start.elapsed().as_secs_f64() * 1000.0,
    );
}

#[derive(Deserialize)]
pub struct RegionQuery {
    pub region: Option<String>,
}

// ─── GET /api/regiones/ ──────────────────────────────────────────

pub async fn regions(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Region>>, ApiError> {
    let start = Instant::now();
    let regions = blocking(&state, |r| r.list_regions()).await?;
    log_request("/api/regiones/", "", regions.len(), start);
    Ok(Json(regions))
}

// ─── GET /api/comunas/?region= ───────────────────────────────────

pub async fn communes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionQuery>,
) -> Result<Json<Vec<Commune>>, ApiError> {
    let start = Instant::now();
    let region = params.region.unwrap_or_default();

    let communes = if region.trim().is_empty() {
        blocking(&state, |r| r.list_all_communes()).await?
    } else {
        let code = region.clone();
        blocking(&state, move |r| r.list_communes(&code)).await?
    };

    log_request("/api/comunas/", &format!("?region={}", region), communes.len(), start);
    Ok(Json(communes))
}

// ─── GET /cargar-comunas/?region= ────────────────────────────────

/// Option shape the listing form's dropdown script reads.
#[derive(Serialize)]
pub struct CommuneOption {
    pub codigo: String,
    pub nombre: String,
}

pub async fn commune_options(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionQuery>,
) -> Result<Json<Vec<CommuneOption>>, ApiError> {
    let start = Instant::now();
    let region = params.region.unwrap_or_default();

    let code = region.clone();
    let communes = blocking(&state, move |r| r.list_communes(&code)).await?;

    log_request("/cargar-comunas/", &format!("?region={}", region), communes.len(), start);
    Ok(Json(
        communes
            .into_iter()
            .map(|c| CommuneOption { codigo: c.code, nombre: c.name })
            .collect(),
    ))
}

// ─── GET /api/validar/?region=&comuna= ───────────────────────────

#[derive(Deserialize)]
pub struct ValidateQuery {
    pub region: Option<String>,
    pub comuna: Option<String>,
}

pub async fn validate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateQuery>,
) -> Result<Json<Selection>, ApiError> {
    let region = params.region.unwrap_or_default();
    let commune = params.comuna.unwrap_or_default();

    blocking(&state, move |r| r.validate_selection(&region, &commune))
        .await?
        .map(Json)
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}
