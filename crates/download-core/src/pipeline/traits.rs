use crate::{Provider, SongId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::time::Duration;

/// Where a downloaded and decrypted song ended up on the device.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct LocalFileRef(pub String);

impl Deref for LocalFileRef {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for LocalFileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CatalogStoreError(pub Box<dyn std::error::Error + Send + Sync>);

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_song_provider(
        &self,
        song_id: &SongId,
    ) -> Result<Option<Provider>, CatalogStoreError>;
    async fn mark_downloaded(
        &self,
        song_id: &SongId,
        local_file: &LocalFileRef,
    ) -> Result<(), CatalogStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The provider refused the transfer because its quota is used up.
    #[error("Provider quota exceeded")]
    QuotaExceeded { retry_after: Option<Duration> },
    #[error("{0}")]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches and decrypts the song, reporting progress as a fraction in `0.0..=1.0`.
    async fn transfer(
        &self,
        song_id: &SongId,
        provider: Provider,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<LocalFileRef, TransportError>;
}
