use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::services::ranking_log::{csv_filename, export_csv, export_json, ExportFormat};
use crate::services::PersonalizationService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub user_id: Option<String>,
    #[serde(default)]
    pub format: ExportFormat,
}

/// GET /api/logs
///
/// Recent ranking decisions as `{logs}` JSON, or as a CSV attachment with
/// `format=csv`.
#[get("/api/logs")]
pub async fn get_logs(
    query: web::Query<LogsQuery>,
    service: web::Data<PersonalizationService>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let user_id = query
        .user_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing userId".to_string()))?;

    let logs = service.recent_logs(&user_id).await;
    debug!(user_id = %user_id, entries = logs.len(), format = ?query.format, "Exporting ranking logs");

    match query.format {
        ExportFormat::Json => Ok(HttpResponse::Ok().json(export_json(&logs))),
        ExportFormat::Csv => Ok(HttpResponse::Ok()
            .content_type("text/csv")
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(csv_filename(&user_id))],
            })
            .body(export_csv(&logs))),
    }
}
