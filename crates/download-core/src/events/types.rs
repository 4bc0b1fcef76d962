use crate::{SongId, UserId};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DataChangeEvent {
    SongsUpdated,
    PlaylistsUpdated,
    SongDeleted(SongId),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn(UserId),
    SignedOut,
}

/// Commands coming from lock screen or headset controls.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    Seek(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PlaybackEvent {
    StateChanged {
        is_playing: bool,
        song_id: Option<SongId>,
    },
    /// Position and length of the current song, in seconds.
    TimeUpdated { current: f64, duration: f64 },
    SongFinished,
    RemoteCommand(RemoteCommand),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DownloadEvent {
    Queued { song_id: SongId, position: usize },
    Started(SongId),
    Progress { song_id: SongId, fraction: f64 },
    SongDownloaded(SongId),
    Failed { song_id: SongId, reason: String },
}

impl DownloadEvent {
    pub fn song_id(&self) -> &SongId {
        match self {
            DownloadEvent::Queued { song_id, .. }
            | DownloadEvent::Progress { song_id, .. }
            | DownloadEvent::Failed { song_id, .. } => song_id,
            DownloadEvent::Started(song_id) | DownloadEvent::SongDownloaded(song_id) => song_id,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "state", content = "song_id", rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing(SongId),
    Paused(SongId),
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }

    pub fn song_id(&self) -> Option<&SongId> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Playing(song_id) | PlaybackState::Paused(song_id) => Some(song_id),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PlaybackTimeInfo {
    pub current: f64,
    pub duration: f64,
}
