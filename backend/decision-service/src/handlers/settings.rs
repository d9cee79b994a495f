use super::AppState;
use crate::error::{AppError, Result};
use crate::models::{Scenario, SettingUpdate};
use actix_web::{web, HttpResponse};

fn parse_scenario(raw: &str) -> Result<Scenario> {
    raw.parse().map_err(AppError::BadRequest)
}

pub async fn get_setting(
    state: web::Data<AppState>,
    scenario: web::Path<String>,
) -> Result<HttpResponse> {
    let setting = state.settings.get(parse_scenario(&scenario)?).await?;
    Ok(HttpResponse::Ok().json(setting))
}

pub async fn put_setting(
    state: web::Data<AppState>,
    scenario: web::Path<String>,
    payload: web::Json<SettingUpdate>,
) -> Result<HttpResponse> {
    let setting = state
        .settings
        .upsert(parse_scenario(&scenario)?, payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(setting))
}
