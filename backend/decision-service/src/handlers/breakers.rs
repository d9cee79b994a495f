//! Provider health reporting from the executor, and breaker administration

use super::AppState;
use crate::error::{AppError, Result};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

pub async fn list_breakers(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.breakers.snapshot())
}

pub async fn record_success(state: web::Data<AppState>, key: web::Path<String>) -> HttpResponse {
    let breaker_state = state.breakers.record_success(&key);
    HttpResponse::Ok().json(json!({"key": key.as_str(), "state": breaker_state}))
}

pub async fn record_failure(state: web::Data<AppState>, key: web::Path<String>) -> HttpResponse {
    let breaker_state = state.breakers.record_failure(&key);
    HttpResponse::Ok().json(json!({"key": key.as_str(), "state": breaker_state}))
}

pub async fn reset_breaker(
    state: web::Data<AppState>,
    key: web::Path<String>,
) -> Result<HttpResponse> {
    if !state.breakers.reset(&key) {
        return Err(AppError::NotFound(format!("circuit breaker {}", key)));
    }
    info!(key = %key, "Circuit breaker reset by admin");
    Ok(HttpResponse::Ok().json(json!({"key": key.as_str(), "state": "closed"})))
}

pub async fn clear_breakers(state: web::Data<AppState>) -> HttpResponse {
    let cleared = state.breakers.clear_all();
    HttpResponse::Ok().json(json!({"cleared": cleared}))
}
