use download_core::{LocalFileRef, Provider, SongId};
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub(crate) struct SongRecord {
    pub(crate) id: SongId,
    pub(crate) title: String,
    pub(crate) artist: String,
    pub(crate) provider: Provider,
    #[serde(default)]
    pub(crate) local_file: Option<LocalFileRef>,
}

impl SongRecord {
    pub(crate) fn is_downloaded(&self) -> bool {
        self.local_file.is_some()
    }
}
