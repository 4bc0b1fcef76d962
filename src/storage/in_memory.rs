use crate::storage::KeyValueStorage;
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub(crate) struct InMemoryStorage {
    storage: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, String>>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStorage for InMemoryStorage {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<String>, std::io::Error> {
        Ok(self.lock().get(prefix).and_then(|m| m.get(key)).cloned())
    }

    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, String>, std::io::Error> {
        Ok(self.lock().get(prefix).cloned().unwrap_or_default())
    }

    async fn save(&self, prefix: &str, key: &str, value: &str) -> Result<(), std::io::Error> {
        self.lock()
            .entry(prefix.into())
            .or_default()
            .insert(key.into(), value.into());

        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> Result<(), std::io::Error> {
        if let Entry::Occupied(mut entry) = self.lock().entry(prefix.into()) {
            let map = entry.get_mut();
            map.remove(key);

            if map.is_empty() {
                entry.remove();
            }
        }

        Ok(())
    }
}
