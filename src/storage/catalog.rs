use crate::storage::KeyValueStorage;
use crate::types::SongRecord;
use async_lock::Mutex;
use async_trait::async_trait;
use download_core::{CatalogStore, CatalogStoreError, LocalFileRef, Provider, SongId};
use std::io::{Error, ErrorKind};
use std::sync::Arc;
use tracing::{debug, error};

const SONGS_PREFIX: &str = "songs";

#[derive(Debug, thiserror::Error)]
pub(crate) enum CatalogError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Corrupted song record: {0}")]
    Corrupted(#[from] serde_json::Error),
}

impl From<CatalogError> for CatalogStoreError {
    fn from(error: CatalogError) -> Self {
        CatalogStoreError(Box::new(error))
    }
}

/// Song records stored as JSON on top of a key-value storage.
pub(crate) struct Catalog {
    storage: Arc<dyn KeyValueStorage>,
    write_lock: Mutex<()>,
}

impl Catalog {
    pub(crate) fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) async fn get_song(&self, song_id: &SongId) -> Result<Option<SongRecord>, CatalogError> {
        match self.storage.get(SONGS_PREFIX, song_id).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn list_songs(&self) -> Result<Vec<SongRecord>, CatalogError> {
        let mut songs = vec![];

        for (key, json) in self.storage.get_all(SONGS_PREFIX).await? {
            match serde_json::from_str::<SongRecord>(&json) {
                Ok(song) => songs.push(song),
                Err(error) => error!(%key, ?error, "Skipping unreadable song record"),
            }
        }

        songs.sort_by(|a, b| (&a.artist, &a.title).cmp(&(&b.artist, &b.title)));

        Ok(songs)
    }

    /// Inserts or replaces a record. A replaced record keeps its downloaded file.
    pub(crate) async fn put_song(&self, mut song: SongRecord) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;

        if song.local_file.is_none() {
            if let Some(existing) = self.get_song(&song.id).await? {
                song.local_file = existing.local_file;
            }
        }

        self.save(&song).await
    }

    pub(crate) async fn delete_song(&self, song_id: &SongId) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;

        self.storage.delete(SONGS_PREFIX, song_id).await?;

        Ok(())
    }

    async fn save(&self, song: &SongRecord) -> Result<(), CatalogError> {
        let json = serde_json::to_string(song)?;
        self.storage.save(SONGS_PREFIX, &song.id, &json).await?;

        debug!(song_id = %song.id, "Song record saved");

        Ok(())
    }
}

#[async_trait]
impl CatalogStore for Catalog {
    async fn get_song_provider(
        &self,
        song_id: &SongId,
    ) -> Result<Option<Provider>, CatalogStoreError> {
        Ok(self.get_song(song_id).await?.map(|song| song.provider))
    }

    async fn mark_downloaded(
        &self,
        song_id: &SongId,
        local_file: &LocalFileRef,
    ) -> Result<(), CatalogStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut song = self.get_song(song_id).await?.ok_or_else(|| {
            CatalogStoreError(Box::new(Error::new(
                ErrorKind::NotFound,
                format!("Song {} has been removed from the catalog", song_id),
            )))
        })?;
        song.local_file = Some(local_file.clone());

        Ok(self.save(&song).await?)
    }
}
