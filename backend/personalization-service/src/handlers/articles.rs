use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::services::{PersonalizationService, RankingRequest, ANONYMOUS_USER};

/// Query parameters for GET /api/articles
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlesQuery {
    pub user_id: Option<String>,
    pub diversity: Option<f64>,
    pub novelty: Option<f64>,
    pub freshness: Option<f64>,
}

/// GET /api/articles
///
/// Personalized ranking with scores and explanation. Weights are taken as
/// given (not clamped); absent ones default to 0.5.
#[get("/api/articles")]
pub async fn get_articles(
    query: web::Query<ArticlesQuery>,
    service: web::Data<PersonalizationService>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());

    debug!(
        user_id = %user_id,
        diversity = ?query.diversity,
        novelty = ?query.novelty,
        freshness = ?query.freshness,
        "Ranking request"
    );

    let response = service
        .rank(RankingRequest {
            user_id,
            diversity: query.diversity,
            novelty: query.novelty,
            freshness: query.freshness,
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}
