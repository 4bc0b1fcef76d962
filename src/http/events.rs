use actix_web::web::{Bytes, Data};
use actix_web::HttpResponse;
use download_core::EventBus;
use futures_lite::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};

/// Streams download events as server-sent events until the client goes away.
pub(crate) async fn download_events(bus: Data<Arc<EventBus>>) -> HttpResponse {
    let subscription = bus.subscribe_download();

    debug!(subscription_id = %subscription.id(), "Download events client connected");

    let events = subscription.filter_map(|event| match serde_json::to_string(&event) {
        Ok(json) => Some(Ok::<_, Infallible>(Bytes::from(format!("data: {}\n\n", json)))),
        Err(error) => {
            error!(?error, "Unable to serialize download event");
            None
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events)
}
