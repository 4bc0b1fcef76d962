use crate::{Provider, SongId};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_QUOTA_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Longest backoff window the broker keeps. Longer requests are shortened to it.
pub const MAX_QUOTA_BACKOFF: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    limits: HashMap<Provider, usize>,
    quota_backoff: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            limits: Provider::ALL
                .iter()
                .map(|provider| (*provider, provider.default_max_concurrent()))
                .collect(),
            quota_backoff: DEFAULT_QUOTA_BACKOFF,
        }
    }
}

impl BrokerConfig {
    pub fn with_limit(mut self, provider: Provider, limit: usize) -> Self {
        let limit = if limit == 0 {
            tracing::warn!(%provider, "Concurrency limit of zero is not allowed, using 1");
            1
        } else {
            limit
        };

        self.limits.insert(provider, limit);
        self
    }

    pub fn with_quota_backoff(mut self, quota_backoff: Duration) -> Self {
        self.quota_backoff = quota_backoff.min(MAX_QUOTA_BACKOFF);
        self
    }

    pub fn max_concurrent(&self, provider: Provider) -> usize {
        self.limits
            .get(&provider)
            .copied()
            .unwrap_or_else(|| provider.default_max_concurrent())
    }

    pub fn quota_backoff(&self) -> Duration {
        self.quota_backoff
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SlotError {
    #[error("Quota exceeded for {provider}, retry in {}", format_retry_after(.retry_after))]
    QuotaExceeded {
        provider: Provider,
        retry_after: Duration,
    },
    #[error("Slot request has been cancelled")]
    Cancelled,
    #[error("Download of {song_id} via {provider} is already pending")]
    AlreadyPending { song_id: SongId, provider: Provider },
}

/// Renders a backoff window the way it is shown to the user: `1h 5m`, `12m` or `40s`.
pub fn format_retry_after(retry_after: &Duration) -> String {
    let total_secs = retry_after.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", total_secs),
        (0, minutes) => format!("{}m", minutes),
        (hours, minutes) => format!("{}h {}m", hours, minutes),
    }
}

#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Granted { epoch: u64 },
    QuotaExceeded { retry_after: Duration },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub provider: Provider,
    pub max_concurrent: usize,
    pub active: usize,
    pub pending: usize,
    pub quota_retry_after_secs: Option<u64>,
}
