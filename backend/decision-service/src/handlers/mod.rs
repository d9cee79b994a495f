/// HTTP surface: rank, feedback, decisions, settings, breakers, admin
mod admin;
mod breakers;
mod recommendations;
mod settings;

pub use admin::{clear_caches, decision_stats, metrics_alert, metrics_segments, metrics_snapshot};
pub use breakers::{clear_breakers, list_breakers, record_failure, record_success, reset_breaker};
pub use recommendations::{feedback, get_decision, rank};
pub use settings::{get_setting, put_setting};

use crate::services::decision_engine::DecisionEngine;
use crate::services::feedback::FeedbackIngestor;
use crate::services::settings::SettingsService;
use actix_web::{web, HttpResponse};
use prometheus::{Encoder, TextEncoder};
use resilience::CircuitBreakerRegistry;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
    pub feedback: FeedbackIngestor,
    pub settings: SettingsService,
    pub breakers: CircuitBreakerRegistry,
    /// Default lookback for decision stats
    pub stats_window_hours: i64,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(prometheus_metrics))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/recommendations")
                        .route("/rank", web::post().to(rank))
                        .route("/feedback", web::post().to(feedback)),
                )
                .route("/decisions/{id}", web::get().to(get_decision))
                .service(
                    web::scope("/settings")
                        .route("/{scenario}", web::get().to(get_setting))
                        .route("/{scenario}", web::put().to(put_setting)),
                )
                .service(
                    web::scope("/circuit-breakers")
                        .route("", web::get().to(list_breakers))
                        .route("/{key:.+}/success", web::post().to(record_success))
                        .route("/{key:.+}/failure", web::post().to(record_failure)),
                )
                .service(
                    web::scope("/admin")
                        .route("/caches/clear", web::post().to(clear_caches))
                        .route("/circuit-breakers/clear", web::post().to(clear_breakers))
                        .route("/circuit-breakers/{key:.+}/reset", web::post().to(reset_breaker))
                        .route("/metrics", web::get().to(metrics_snapshot))
                        .route("/metrics/segments", web::get().to(metrics_segments))
                        .route("/metrics/alert", web::get().to(metrics_alert))
                        .route("/decision-stats", web::get().to(decision_stats)),
                ),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "decision-service"
    }))
}

async fn prometheus_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
