use crate::http::ApiError;
use crate::storage::Catalog;
use crate::types::SongRecord;
use crate::utils::is_plain_file_name;
use actix_web::web::{Data, Path};
use actix_web::HttpResponse;
use download_core::{DownloadError, DownloadPipeline, EventBus, Provider, SlotBroker, SongId};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Serialize)]
pub(crate) struct DownloadStatus {
    song_id: SongId,
    provider: Provider,
    downloaded: bool,
    queue_position: Option<usize>,
    progress: Option<f64>,
}

async fn find_song(catalog: &Catalog, song_id: &SongId) -> Result<SongRecord, ApiError> {
    if !is_plain_file_name(song_id) {
        return Err(ApiError::NotFound(format!("Song {} is not in the library", song_id)));
    }

    catalog
        .get_song(song_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Song {} is not in the library", song_id)))
}

fn download_status(song: &SongRecord, broker: &SlotBroker, bus: &EventBus) -> DownloadStatus {
    DownloadStatus {
        song_id: song.id.clone(),
        provider: song.provider,
        downloaded: song.is_downloaded(),
        queue_position: broker.queue_position(&song.id, song.provider),
        progress: bus.state().download_progress(&song.id),
    }
}

pub(crate) async fn get_download_status(
    song_id: Path<String>,
    catalog: Data<Arc<Catalog>>,
    broker: Data<Arc<SlotBroker>>,
    bus: Data<Arc<EventBus>>,
) -> Result<HttpResponse, ApiError> {
    let song = find_song(&catalog, &SongId::from(song_id.into_inner())).await?;

    Ok(HttpResponse::Ok().json(download_status(&song, &broker, &bus)))
}

/// Accepts the download and runs it in the background.
/// Progress and the outcome are published on the download topic.
pub(crate) async fn start_download(
    song_id: Path<String>,
    catalog: Data<Arc<Catalog>>,
    broker: Data<Arc<SlotBroker>>,
    bus: Data<Arc<EventBus>>,
    pipeline: Data<Arc<DownloadPipeline>>,
) -> Result<HttpResponse, ApiError> {
    let song = find_song(&catalog, &SongId::from(song_id.into_inner())).await?;
    let provider = song.provider;

    if let Some(retry_after) = broker.quota_retry_after(provider) {
        let error = DownloadError::QuotaExceeded {
            provider,
            retry_after,
        };
        return Err(ApiError::TooManyRequests(
            error.user_message().unwrap_or_else(|| error.to_string()),
        ));
    }

    if broker.queue_position(&song.id, provider).is_some() {
        let error = DownloadError::AlreadyPending(song.id.clone());
        return Err(ApiError::Conflict(
            error.user_message().unwrap_or_else(|| error.to_string()),
        ));
    }

    actix_rt::spawn({
        let pipeline = Arc::clone(pipeline.get_ref());
        let song_id = song.id.clone();

        async move {
            if let Err(error) = pipeline.download_song(&song_id).await {
                debug!(%song_id, %error, "Background download finished with error");
            }
        }
    });

    Ok(HttpResponse::Accepted().json(download_status(&song, &broker, &bus)))
}

pub(crate) async fn cancel_download(
    song_id: Path<String>,
    pipeline: Data<Arc<DownloadPipeline>>,
) -> Result<HttpResponse, ApiError> {
    let song_id = SongId::from(song_id.into_inner());

    if pipeline.cancel_download(&song_id) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound(format!(
            "Song {} is not waiting to download",
            song_id
        )))
    }
}
