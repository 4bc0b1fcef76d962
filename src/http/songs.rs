use crate::http::{parse_provider, ApiError};
use crate::storage::Catalog;
use crate::types::SongRecord;
use crate::utils::is_plain_file_name;
use actix_web::web::{Data, Json, Path};
use actix_web::HttpResponse;
use download_core::{DataChangeEvent, DownloadPipeline, EventBus, SongId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub(crate) struct SongPayload {
    title: String,
    artist: String,
    provider: String,
}

pub(crate) async fn list_songs(catalog: Data<Arc<Catalog>>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(catalog.list_songs().await?))
}

pub(crate) async fn put_song(
    song_id: Path<String>,
    payload: Json<SongPayload>,
    catalog: Data<Arc<Catalog>>,
    bus: Data<Arc<EventBus>>,
) -> Result<HttpResponse, ApiError> {
    let song_id = SongId::from(song_id.into_inner());

    if !is_plain_file_name(&song_id) {
        return Err(ApiError::BadRequest(format!("Invalid song id: {}", song_id)));
    }

    let SongPayload {
        title,
        artist,
        provider,
    } = payload.into_inner();

    catalog
        .put_song(SongRecord {
            id: song_id.clone(),
            title,
            artist,
            provider: parse_provider(&provider)?,
            local_file: None,
        })
        .await?;

    bus.emit_data_change(DataChangeEvent::SongsUpdated);

    let song = catalog
        .get_song(&song_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Song {} has just been removed", song_id)))?;

    Ok(HttpResponse::Ok().json(song))
}

pub(crate) async fn delete_song(
    song_id: Path<String>,
    catalog: Data<Arc<Catalog>>,
    pipeline: Data<Arc<DownloadPipeline>>,
    bus: Data<Arc<EventBus>>,
) -> Result<HttpResponse, ApiError> {
    let song_id = SongId::from(song_id.into_inner());

    if catalog.get_song(&song_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Song {} is not in the library",
            song_id
        )));
    }

    if pipeline.cancel_download(&song_id) {
        info!(%song_id, "Pending download cancelled with the song");
    }

    catalog.delete_song(&song_id).await?;
    bus.emit_data_change(DataChangeEvent::SongDeleted(song_id));

    Ok(HttpResponse::NoContent().finish())
}
