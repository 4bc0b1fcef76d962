use actix_web::web::Data;
use actix_web::HttpResponse;
use download_core::EventBus;
use std::sync::Arc;

pub(crate) async fn get_snapshot(bus: Data<Arc<EventBus>>) -> HttpResponse {
    HttpResponse::Ok().json(bus.snapshot())
}
