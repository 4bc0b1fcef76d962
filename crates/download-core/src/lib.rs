mod broker;
pub use broker::*;

mod events;
pub use events::*;

mod pipeline;
pub use pipeline::*;

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;

// SongId
#[derive(Eq, PartialEq, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct SongId(pub String);

impl Deref for SongId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for SongId {
    fn from(value: &str) -> Self {
        SongId(value.to_string())
    }
}

impl From<String> for SongId {
    fn from(value: String) -> Self {
        SongId(value)
    }
}

impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// UserId
#[derive(Eq, PartialEq, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct UserId(pub String);

impl Deref for UserId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cloud storage backend a song is synced from.
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GoogleDrive,
    Mega,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::GoogleDrive, Provider::Mega];

    /// Concurrent transfers the backend tolerates before throttling.
    pub fn default_max_concurrent(&self) -> usize {
        match self {
            Provider::GoogleDrive => 3,
            Provider::Mega => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GoogleDrive => "google_drive",
            Provider::Mega => "mega",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_drive" | "gdrive" => Ok(Provider::GoogleDrive),
            "mega" => Ok(Provider::Mega),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}
