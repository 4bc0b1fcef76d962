use crate::broker::{format_retry_after, SlotBroker, SlotError, SlotPermit};
use crate::events::{DataChangeEvent, DownloadEvent, EventBus};
use crate::pipeline::traits::{
    CatalogStore, CatalogStoreError, LocalFileRef, Transport, TransportError,
};
use crate::{Provider, SongId};
use futures_lite::future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Song {0} is not in the catalog")]
    SongNotFound(SongId),
    #[error("Quota exceeded for {provider}, retry in {}", format_retry_after(.retry_after))]
    QuotaExceeded {
        provider: Provider,
        retry_after: Duration,
    },
    #[error("Download has been cancelled")]
    Cancelled,
    #[error("Download of {0} is already pending")]
    AlreadyPending(SongId),
    #[error("Transfer failed: {0}")]
    TransferFailed(#[source] TransportError),
    #[error(transparent)]
    CatalogStoreError(#[from] CatalogStoreError),
}

impl From<SlotError> for DownloadError {
    fn from(error: SlotError) -> Self {
        match error {
            SlotError::QuotaExceeded {
                provider,
                retry_after,
            } => DownloadError::QuotaExceeded {
                provider,
                retry_after,
            },
            SlotError::Cancelled => DownloadError::Cancelled,
            SlotError::AlreadyPending { song_id, .. } => DownloadError::AlreadyPending(song_id),
        }
    }
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }

    /// Message shown to the user. Cancellations are not reported.
    pub fn user_message(&self) -> Option<String> {
        match self {
            DownloadError::Cancelled => None,
            DownloadError::QuotaExceeded { retry_after, .. } => Some(format!(
                "quota exceeded, retry in {}",
                format_retry_after(retry_after)
            )),
            DownloadError::SongNotFound(_) => Some("song is no longer in the library".into()),
            DownloadError::AlreadyPending(_) => Some("song is already waiting to download".into()),
            DownloadError::TransferFailed(_) => Some("download failed".into()),
            DownloadError::CatalogStoreError(_) => Some("unable to update the library".into()),
        }
    }
}

/// Runs a single song download: slot, transfer, release, catalog update, events.
pub struct DownloadPipeline {
    broker: Arc<SlotBroker>,
    bus: Arc<EventBus>,
    catalog: Arc<dyn CatalogStore>,
    transport: Arc<dyn Transport>,
}

impl DownloadPipeline {
    pub fn new(
        broker: Arc<SlotBroker>,
        bus: Arc<EventBus>,
        catalog: Arc<dyn CatalogStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            broker,
            bus,
            catalog,
            transport,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn download_song(&self, song_id: &SongId) -> Result<LocalFileRef, DownloadError> {
        let provider = self
            .catalog
            .get_song_provider(song_id)
            .await?
            .ok_or_else(|| DownloadError::SongNotFound(song_id.clone()))?;

        let permit = self.acquire_slot(song_id, provider).await?;

        info!(%provider, "Starting transfer");
        self.bus.emit_download(DownloadEvent::Started(song_id.clone()));

        let unfinished = UnfinishedDownload {
            bus: &self.bus,
            song_id,
            armed: true,
        };
        let result = self.transfer_and_store(song_id, provider, permit).await;
        unfinished.disarm();

        result
    }

    async fn transfer_and_store(
        &self,
        song_id: &SongId,
        provider: Provider,
        permit: SlotPermit,
    ) -> Result<LocalFileRef, DownloadError> {
        let on_progress = |fraction: f64| {
            self.bus.emit_download(DownloadEvent::Progress {
                song_id: song_id.clone(),
                fraction,
            });
        };
        let transfer = self
            .transport
            .transfer(song_id, provider, &on_progress)
            .await;

        let local_file = match transfer {
            Ok(local_file) => {
                drop(permit);
                local_file
            }
            Err(TransportError::QuotaExceeded { retry_after }) => {
                // The window must be in place before the slot can pass to a queued song.
                self.broker.mark_quota_exceeded(provider, retry_after);
                drop(permit);

                let retry_after = self
                    .broker
                    .quota_retry_after(provider)
                    .or(retry_after)
                    .unwrap_or_default();
                let error = DownloadError::QuotaExceeded {
                    provider,
                    retry_after,
                };
                self.report_failure(song_id, &error);
                return Err(error);
            }
            Err(error) => {
                drop(permit);
                let error = DownloadError::TransferFailed(error);
                self.report_failure(song_id, &error);
                return Err(error);
            }
        };

        if let Err(error) = self.catalog.mark_downloaded(song_id, &local_file).await {
            let error = DownloadError::from(error);
            self.report_failure(song_id, &error);
            return Err(error);
        }

        info!(%local_file, "Song downloaded");

        self.bus
            .emit_download(DownloadEvent::SongDownloaded(song_id.clone()));
        self.bus.emit_data_change(DataChangeEvent::SongsUpdated);

        Ok(local_file)
    }

    /// Withdraws a download that is still waiting for a slot.
    pub fn cancel_download(&self, song_id: &SongId) -> bool {
        self.broker.cancel_pending(song_id)
    }

    async fn acquire_slot(
        &self,
        song_id: &SongId,
        provider: Provider,
    ) -> Result<SlotPermit, DownloadError> {
        let acquire = self.broker.acquire(song_id, provider);
        futures_lite::pin!(acquire);

        if let Some(result) = future::poll_once(acquire.as_mut()).await {
            return Ok(result?);
        }

        if let Some(position) = self.broker.queue_position(song_id, provider) {
            debug!(%provider, position, "Waiting for a download slot");
            self.bus.emit_download(DownloadEvent::Queued {
                song_id: song_id.clone(),
                position,
            });
        }

        match acquire.await {
            Ok(permit) => Ok(permit),
            Err(error) => {
                let error = DownloadError::from(error);
                self.report_failure(song_id, &error);
                Err(error)
            }
        }
    }

    fn report_failure(&self, song_id: &SongId, error: &DownloadError) {
        if !error.is_cancelled() {
            warn!(%song_id, %error, "Download failed");
        }

        self.bus.emit_download(DownloadEvent::Failed {
            song_id: song_id.clone(),
            reason: error.to_string(),
        });
    }
}

/// Reports a started download as cancelled if its future is dropped before it finishes.
struct UnfinishedDownload<'a> {
    bus: &'a EventBus,
    song_id: &'a SongId,
    armed: bool,
}

impl UnfinishedDownload<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for UnfinishedDownload<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(song_id = %self.song_id, "Download dropped while in progress");
            self.bus.emit_download(DownloadEvent::Failed {
                song_id: self.song_id.clone(),
                reason: DownloadError::Cancelled.to_string(),
            });
        }
    }
}
