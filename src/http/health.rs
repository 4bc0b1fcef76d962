use crate::storage::Catalog;
use crate::VERSION;
use actix_web::web::Data;
use actix_web::{HttpResponse, Responder};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

pub(crate) async fn readiness_check(catalog: Data<Arc<Catalog>>) -> impl Responder {
    if let Err(error) = catalog.list_songs().await {
        error!(?error, "Readiness check failed");
        return HttpResponse::ServiceUnavailable().finish();
    }

    HttpResponse::Ok().json(json!({ "version": VERSION }))
}
