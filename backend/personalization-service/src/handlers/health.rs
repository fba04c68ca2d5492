use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::store::StoreHandle;

pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Readiness never fails on storage: the service degrades rather than
/// refusing traffic when the store is down.
pub async fn readiness(store: web::Data<StoreHandle>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ready",
        "store": store.health(),
    }))
}
