use super::AppState;
use crate::error::{AppError, Result};
use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ClearCachesRequest {
    #[serde(default = "yes")]
    pub pool: bool,
    #[serde(default = "yes")]
    pub decisions: bool,
}

fn yes() -> bool {
    true
}

impl Default for ClearCachesRequest {
    fn default() -> Self {
        Self {
            pool: true,
            decisions: true,
        }
    }
}

/// Body is optional; an empty POST clears everything
pub async fn clear_caches(
    state: web::Data<AppState>,
    payload: Option<web::Json<ClearCachesRequest>>,
) -> HttpResponse {
    let request = payload.map(web::Json::into_inner).unwrap_or_default();
    let report = state
        .engine
        .clear_caches(request.pool, request.decisions)
        .await;
    HttpResponse::Ok().json(report)
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub format: Option<String>,
}

pub async fn metrics_snapshot(
    state: web::Data<AppState>,
    query: web::Query<MetricsQuery>,
) -> Result<HttpResponse> {
    let now = Utc::now();
    let metrics = state.engine.metrics();
    match query.format.as_deref().unwrap_or("json") {
        "json" => Ok(HttpResponse::Ok().json(metrics.snapshot(now))),
        "csv" => Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .body(metrics.to_csv(now))),
        other => Err(AppError::BadRequest(format!("unsupported format: {}", other))),
    }
}

pub async fn metrics_segments(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.engine.metrics().segments(Utc::now()))
}

/// Re-evaluates thresholds, then reports the most recent alert
pub async fn metrics_alert(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.engine.metrics();
    let alerting = metrics.should_alert(Utc::now());
    HttpResponse::Ok().json(json!({
        "alerting": alerting,
        "lastAlert": metrics.last_alert(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub hours: Option<i64>,
}

pub async fn decision_stats(
    state: web::Data<AppState>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse> {
    let hours = query.hours.unwrap_or(state.stats_window_hours);
    if hours <= 0 {
        return Err(AppError::Validation("hours must be positive".to_string()));
    }
    let since = Duration::try_hours(hours)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| AppError::Validation(format!("hours out of range: {}", hours)))?;
    let stats = state.engine.decision_stats(since).await?;
    Ok(HttpResponse::Ok().json(stats))
}
