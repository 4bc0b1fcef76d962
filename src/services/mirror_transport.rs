use crate::utils::is_plain_file_name;
use async_trait::async_trait;
use download_core::{LocalFileRef, Provider, SongId, Transport, TransportError};
use futures_lite::StreamExt;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Marker file a provider directory carries while its quota is used up.
/// Its content, if any, is the number of seconds until the quota resets.
const QUOTA_MARKER: &str = ".quota_exceeded";

fn failed(error: Error) -> TransportError {
    TransportError::Failed(Box::new(error))
}

/// Fetches songs from a local mirror of the cloud folders,
/// laid out as `<mirror>/<provider>/<song id>`.
pub(crate) struct MirrorTransport {
    mirror_directory: PathBuf,
    download_directory: PathBuf,
}

impl MirrorTransport {
    pub(crate) fn create(
        mirror_directory: impl Into<PathBuf>,
        download_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mirror_directory: mirror_directory.into(),
            download_directory: download_directory.into(),
        }
    }

    async fn check_quota(&self, provider: Provider) -> Result<(), TransportError> {
        let marker = self.mirror_directory.join(provider.as_str()).join(QUOTA_MARKER);

        match tokio::fs::read_to_string(&marker).await {
            Ok(content) => {
                let retry_after = content.trim().parse().ok().map(Duration::from_secs);
                warn!(%provider, ?retry_after, "Provider reports exceeded quota");
                Err(TransportError::QuotaExceeded { retry_after })
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(failed(error)),
        }
    }
}

#[async_trait]
impl Transport for MirrorTransport {
    async fn transfer(
        &self,
        song_id: &SongId,
        provider: Provider,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<LocalFileRef, TransportError> {
        if !is_plain_file_name(song_id) {
            return Err(failed(Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid song id: {}", song_id),
            )));
        }

        self.check_quota(provider).await?;

        let source_path = self.mirror_directory.join(provider.as_str()).join(&**song_id);
        let source = File::open(&source_path).await.map_err(failed)?;
        let total_bytes = source.metadata().await.map_err(failed)?.len();

        create_dir_all(&self.download_directory)
            .await
            .map_err(failed)?;

        let destination = self.download_directory.join(&**song_id);
        let partial = self.download_directory.join(format!("{}.part", song_id));
        let mut output = File::create(&partial).await.map_err(failed)?;

        debug!(%song_id, %provider, total_bytes, "Copying song from mirror");

        let mut chunks = ReaderStream::with_capacity(source, CHUNK_SIZE);
        let mut written_bytes = 0u64;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(failed)?;
            output.write_all(&chunk).await.map_err(failed)?;
            written_bytes += chunk.len() as u64;

            if total_bytes > 0 {
                on_progress(written_bytes as f64 / total_bytes as f64);
            }
        }

        output.flush().await.map_err(failed)?;
        drop(output);

        if total_bytes == 0 {
            on_progress(1.0);
        }

        tokio::fs::rename(&partial, &destination)
            .await
            .map_err(failed)?;

        Ok(LocalFileRef(destination.to_string_lossy().into_owned()))
    }
}
