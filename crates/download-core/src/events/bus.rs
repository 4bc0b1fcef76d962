use crate::events::channel::{Subscription, TypedChannel};
use crate::events::snapshot::{Reduce, Snapshot, StateStore};
use crate::events::types::{
    AuthEvent, DataChangeEvent, DownloadEvent, PlaybackEvent, PlaybackState, PlaybackTimeInfo,
};
use crate::UserId;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Four independent topics plus the state derived from them.
///
/// Emitting never fails and never waits for subscribers. The snapshot is
/// updated before the event is handed to subscribers, so anyone reading it
/// right after `emit_*` returns sees the effect of that event. Emissions are
/// serialized, so the snapshot always reflects the last event subscribers got.
pub struct EventBus {
    data_change: TypedChannel<DataChangeEvent>,
    auth: TypedChannel<AuthEvent>,
    playback: TypedChannel<PlaybackEvent>,
    download: TypedChannel<DownloadEvent>,
    state: StateStore,
    emit_lock: Mutex<()>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            data_change: TypedChannel::new("data_change"),
            auth: TypedChannel::new("auth"),
            playback: TypedChannel::new("playback"),
            download: TypedChannel::new("download"),
            state: StateStore::new(),
            emit_lock: Mutex::new(()),
        }
    }

    fn publish<E>(&self, channel: &TypedChannel<E>, event: E)
    where
        E: Reduce + Clone + std::fmt::Debug,
    {
        let _guard = self.emit_lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.state.apply(&event);

        trace!(?event, "Emitting event");

        channel.send(event);
    }

    pub fn emit_data_change(&self, event: DataChangeEvent) {
        self.publish(&self.data_change, event);
    }

    pub fn emit_auth(&self, event: AuthEvent) {
        self.publish(&self.auth, event);
    }

    pub fn emit_playback(&self, event: PlaybackEvent) {
        self.publish(&self.playback, event);
    }

    pub fn emit_download(&self, event: DownloadEvent) {
        self.publish(&self.download, event);
    }

    pub fn subscribe_data_change(&self) -> Subscription<DataChangeEvent> {
        self.data_change.subscribe()
    }

    pub fn subscribe_auth(&self) -> Subscription<AuthEvent> {
        self.auth.subscribe()
    }

    pub fn subscribe_playback(&self) -> Subscription<PlaybackEvent> {
        self.playback.subscribe()
    }

    pub fn subscribe_download(&self) -> Subscription<DownloadEvent> {
        self.download.subscribe()
    }

    pub fn subscriber_counts(&self) -> [(&'static str, usize); 4] {
        [
            ("data_change", self.data_change.subscriber_count()),
            ("auth", self.auth.subscriber_count()),
            ("playback", self.playback.subscriber_count()),
            ("download", self.download.subscriber_count()),
        ]
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn auth_user_id(&self) -> Option<UserId> {
        self.state.auth_user_id()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.playback_state()
    }

    pub fn playback_time(&self) -> Option<PlaybackTimeInfo> {
        self.state.playback_time()
    }

    pub fn last_data_event(&self) -> Option<DataChangeEvent> {
        self.state.last_data_event()
    }
}
