mod in_memory;
pub(crate) use in_memory::InMemoryStorage;

mod on_disk;
pub(crate) use on_disk::OnDiskStorage;

mod catalog;
pub(crate) use catalog::*;

use async_trait::async_trait;
use std::collections::HashMap;

/// String values grouped under a prefix, the way song records are persisted.
#[async_trait]
pub(crate) trait KeyValueStorage: Send + Sync {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<String>, std::io::Error>;
    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, String>, std::io::Error>;
    async fn save(&self, prefix: &str, key: &str, value: &str) -> Result<(), std::io::Error>;
    async fn delete(&self, prefix: &str, key: &str) -> Result<(), std::io::Error>;
}
