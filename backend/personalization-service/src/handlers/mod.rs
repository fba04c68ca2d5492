pub mod articles;
pub mod feedback;
pub mod health;
pub mod logs;
pub mod preferences;

pub use articles::get_articles;
pub use feedback::post_feedback;
pub use logs::get_logs;
pub use preferences::{get_preferences, update_preferences};

use actix_web::web;

use crate::error::AppError;
use crate::metrics::serve_metrics;

/// Register every route plus JSON/query extractor error handling.
///
/// Expects `web::Data<PersonalizationService>` and `web::Data<StoreHandle>`
/// to be registered on the app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(format!("Invalid JSON body: {}", err)).into()
    }))
    .app_data(
        web::QueryConfig::default().error_handler(|err, _req| {
            AppError::BadRequest(format!("Invalid query parameters: {}", err)).into()
        }),
    )
    .route("/health", web::get().to(health::liveness))
    .route("/api/v1/health/live", web::get().to(health::liveness))
    .route("/api/v1/health/ready", web::get().to(health::readiness))
    .route("/metrics", web::get().to(serve_metrics))
    .service(get_articles)
    .service(post_feedback)
    .service(update_preferences)
    .service(get_preferences)
    .service(get_logs);
}
