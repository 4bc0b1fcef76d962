mod downloads;
mod error;
mod events;
mod health;
mod providers;
mod songs;
mod state;


pub(crate) use error::ApiError;

use actix_web::web;
use download_core::Provider;

pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health::readiness_check)))
        .service(web::resource("/songs").route(web::get().to(songs::list_songs)))
        .service(
            web::resource("/songs/{song_id}")
                .route(web::put().to(songs::put_song))
                .route(web::delete().to(songs::delete_song)),
        )
        .service(
            web::resource("/downloads/{song_id}")
                .route(web::get().to(downloads::get_download_status))
                .route(web::post().to(downloads::start_download))
                .route(web::delete().to(downloads::cancel_download)),
        )
        .service(web::resource("/providers").route(web::get().to(providers::list_providers)))
        .service(
            web::resource("/providers/{provider}")
                .route(web::get().to(providers::get_provider_status)),
        )
        .service(
            web::resource("/providers/{provider}/quota")
                .route(web::post().to(providers::mark_quota_exceeded)),
        )
        .service(web::resource("/state").route(web::get().to(state::get_snapshot)))
        .service(
            web::resource("/events/downloads").route(web::get().to(events::download_events)),
        );
}

fn parse_provider(value: &str) -> Result<Provider, ApiError> {
    value
        .parse::<Provider>()
        .map_err(|error| ApiError::BadRequest(error.to_string()))
}
