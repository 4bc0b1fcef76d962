use crate::storage::KeyValueStorage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::create_dir_all;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One file per key under `<root>/<prefix>/`.
///
/// Values are written to a temporary file first and renamed into place, so a
/// crash never leaves a half-written record behind.
pub(crate) struct OnDiskStorage {
    root: PathBuf,
}

impl OnDiskStorage {
    pub(crate) fn create(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn prefix_path(&self, prefix: &str) -> PathBuf {
        self.root.join(prefix)
    }
}

#[async_trait]
impl KeyValueStorage for OnDiskStorage {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<String>, std::io::Error> {
        match tokio::fs::read_to_string(self.prefix_path(prefix).join(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, String>, std::io::Error> {
        let path = self.prefix_path(prefix);
        let mut map = HashMap::new();

        let mut dir_reader = match tokio::fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(map),
            Err(error) => return Err(error),
        };

        while let Some(entry) = dir_reader.next_entry().await? {
            let filename = match entry.file_name().to_str() {
                Some(filename) if !filename.ends_with(".tmp") => filename.to_string(),
                _ => continue,
            };
            let content = tokio::fs::read_to_string(entry.path()).await?;
            map.insert(filename, content);
        }

        Ok(map)
    }

    async fn save(&self, prefix: &str, key: &str, value: &str) -> Result<(), std::io::Error> {
        let directory = self.prefix_path(prefix);
        create_dir_all(&directory).await?;

        let temp_path = directory.join(format!("{}.{}.tmp", key, Uuid::new_v4()));
        let mut file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;

        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, directory.join(key)).await
    }

    async fn delete(&self, prefix: &str, key: &str) -> Result<(), std::io::Error> {
        match tokio::fs::remove_file(self.prefix_path(prefix).join(key)).await {
            Err(error) if error.kind() != ErrorKind::NotFound => Err(error),
            _ => Ok(()),
        }
    }
}
