use super::AppState;
use crate::error::{AppError, Result};
use crate::models::{FeedbackRequest, RankRequest};
use actix_web::{web, HttpResponse};
use uuid::Uuid;

pub async fn rank(
    state: web::Data<AppState>,
    payload: web::Json<RankRequest>,
) -> Result<HttpResponse> {
    let response = state.engine.rank(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn feedback(
    state: web::Data<AppState>,
    payload: web::Json<FeedbackRequest>,
) -> Result<HttpResponse> {
    let response = state.feedback.ingest(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn get_decision(
    state: web::Data<AppState>,
    decision_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = Uuid::parse_str(&decision_id)
        .map_err(|_| AppError::BadRequest("Invalid decision ID".to_string()))?;
    let details = state.engine.decision_details(id).await?;
    Ok(HttpResponse::Ok().json(details))
}
