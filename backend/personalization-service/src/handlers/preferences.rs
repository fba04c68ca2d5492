use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::PreferenceUpdate;
use crate::services::PersonalizationService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesRequest {
    pub user_id: Option<String>,
    pub preferences: Option<PreferenceUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesQuery {
    pub user_id: Option<String>,
}

/// POST /api/preferences
///
/// Partial update; supplied weights are clamped into [0, 1].
#[post("/api/preferences")]
pub async fn update_preferences(
    body: web::Json<PreferencesRequest>,
    service: web::Data<PersonalizationService>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let (user_id, update) = match (body.user_id.filter(|s| !s.is_empty()), body.preferences) {
        (Some(user_id), Some(update)) => (user_id, update),
        _ => {
            return Err(AppError::BadRequest(
                "Missing userId or preferences".to_string(),
            ))
        }
    };

    service.update_preferences(&user_id, &update).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// GET /api/preferences
#[get("/api/preferences")]
pub async fn get_preferences(
    query: web::Query<PreferencesQuery>,
    service: web::Data<PersonalizationService>,
) -> Result<HttpResponse> {
    let user_id = query
        .into_inner()
        .user_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing userId".to_string()))?;

    let preferences = service.get_preferences(&user_id).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "preferences": preferences })))
}
