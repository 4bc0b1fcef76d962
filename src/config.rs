use download_core::{BrokerConfig, Provider};
use serde::Deserialize;
use std::time::Duration;

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30u64
}

fn default_google_drive_max_concurrent() -> usize {
    Provider::GoogleDrive.default_max_concurrent()
}

fn default_mega_max_concurrent() -> usize {
    Provider::Mega.default_max_concurrent()
}

fn default_quota_backoff_secs() -> u64 {
    60 * 60
}

fn default_mirror_directory() -> String {
    "mirror".to_string()
}

fn default_download_directory() -> String {
    "downloads".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_bind_address")]
    pub(crate) bind_address: String,
    #[serde(default = "default_shutdown_timeout")]
    pub(crate) shutdown_timeout: u64,
    #[serde(default = "default_google_drive_max_concurrent")]
    pub(crate) google_drive_max_concurrent: usize,
    #[serde(default = "default_mega_max_concurrent")]
    pub(crate) mega_max_concurrent: usize,
    #[serde(default = "default_quota_backoff_secs")]
    pub(crate) quota_backoff_secs: u64,
    pub(crate) catalog_directory: Option<String>,
    #[serde(default = "default_mirror_directory")]
    pub(crate) mirror_directory: String,
    #[serde(default = "default_download_directory")]
    pub(crate) download_directory: String,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self, envy::Error> {
        envy::from_env::<Self>()
    }

    pub(crate) fn broker_config(&self) -> BrokerConfig {
        BrokerConfig::default()
            .with_limit(Provider::GoogleDrive, self.google_drive_max_concurrent)
            .with_limit(Provider::Mega, self.mega_max_concurrent)
            .with_quota_backoff(Duration::from_secs(self.quota_backoff_secs))
    }
}
