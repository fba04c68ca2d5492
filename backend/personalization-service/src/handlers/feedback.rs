use actix_web::{post, web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, Result};
use crate::services::{FeedbackEvent, PersonalizationService};

/// Body for POST /api/feedback. `feedback` is an opaque signal forwarded
/// to the scoring oracle as received.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub user_id: Option<String>,
    pub article_id: Option<String>,
    #[serde(default)]
    pub feedback: Option<serde_json::Value>,
    pub topic: Option<String>,
}

/// POST /api/feedback
#[post("/api/feedback")]
pub async fn post_feedback(
    body: web::Json<FeedbackRequest>,
    service: web::Data<PersonalizationService>,
) -> Result<HttpResponse> {
    let body = body.into_inner();

    let (user_id, article_id, feedback) = match (
        body.user_id.filter(|s| !s.is_empty()),
        body.article_id.filter(|s| !s.is_empty()),
        body.feedback,
    ) {
        (Some(user_id), Some(article_id), Some(feedback)) => (user_id, article_id, feedback),
        _ => return Err(AppError::BadRequest("Missing required fields".to_string())),
    };

    let (mutation, _forward) = service
        .record_feedback(FeedbackEvent {
            user_id,
            article_id,
            feedback,
            topic: body.topic,
        })
        .await;

    info!(
        user_id = %mutation.vector.user_id,
        persisted = mutation.outcome.is_persisted(),
        "Feedback recorded"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
