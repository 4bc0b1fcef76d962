use crate::events::types::{
    AuthEvent, DataChangeEvent, DownloadEvent, PlaybackEvent, PlaybackState, PlaybackTimeInfo,
};
use crate::{SongId, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Last known state derived from emitted events.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub last_data_event: Option<DataChangeEvent>,
    pub auth_user_id: Option<UserId>,
    pub playback_state: PlaybackState,
    pub playback_time: Option<PlaybackTimeInfo>,
    pub download_progress: HashMap<SongId, f64>,
}

/// Folds an event into the snapshot.
pub(crate) trait Reduce {
    fn reduce(&self, snapshot: &mut Snapshot);
}

impl Reduce for DataChangeEvent {
    fn reduce(&self, snapshot: &mut Snapshot) {
        snapshot.last_data_event = Some(self.clone());
    }
}

impl Reduce for AuthEvent {
    fn reduce(&self, snapshot: &mut Snapshot) {
        snapshot.auth_user_id = match self {
            AuthEvent::SignedIn(user_id) => Some(user_id.clone()),
            AuthEvent::SignedOut => None,
        };
    }
}

impl Reduce for PlaybackEvent {
    fn reduce(&self, snapshot: &mut Snapshot) {
        match self {
            PlaybackEvent::StateChanged {
                is_playing,
                song_id,
            } => {
                snapshot.playback_state = match (is_playing, song_id) {
                    (_, None) => PlaybackState::Idle,
                    (true, Some(song_id)) => PlaybackState::Playing(song_id.clone()),
                    (false, Some(song_id)) => PlaybackState::Paused(song_id.clone()),
                };
            }
            PlaybackEvent::TimeUpdated { current, duration } => {
                snapshot.playback_time = Some(PlaybackTimeInfo {
                    current: *current,
                    duration: *duration,
                });
            }
            PlaybackEvent::SongFinished => {
                snapshot.playback_state = PlaybackState::Idle;
            }
            // Translated into playback actions further up.
            PlaybackEvent::RemoteCommand(_) => (),
        }
    }
}

impl Reduce for DownloadEvent {
    fn reduce(&self, snapshot: &mut Snapshot) {
        match self {
            DownloadEvent::Queued { song_id, .. } | DownloadEvent::Started(song_id) => {
                snapshot.download_progress.insert(song_id.clone(), 0.0);
            }
            DownloadEvent::Progress { song_id, fraction } => {
                snapshot
                    .download_progress
                    .insert(song_id.clone(), fraction.clamp(0.0, 1.0));
            }
            DownloadEvent::SongDownloaded(song_id) | DownloadEvent::Failed { song_id, .. } => {
                snapshot.download_progress.remove(song_id);
            }
        }
    }
}

/// Synchronously readable state, updated by the bus before an event is fanned out.
///
/// Each event is applied under a single write lock, so readers never see it
/// half-applied.
#[derive(Default)]
pub struct StateStore {
    snapshot: RwLock<Snapshot>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn apply<E: Reduce>(&self, event: &E) {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        event.reduce(&mut snapshot);
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);

        f(&snapshot)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read(|s| s.clone())
    }

    pub fn last_data_event(&self) -> Option<DataChangeEvent> {
        self.read(|s| s.last_data_event.clone())
    }

    pub fn auth_user_id(&self) -> Option<UserId> {
        self.read(|s| s.auth_user_id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|s| s.auth_user_id.is_some())
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.read(|s| s.playback_state.clone())
    }

    pub fn playback_time(&self) -> Option<PlaybackTimeInfo> {
        self.read(|s| s.playback_time)
    }

    pub fn download_progress(&self, song_id: &SongId) -> Option<f64> {
        self.read(|s| s.download_progress.get(song_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce_all<E: Reduce>(events: &[E]) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for event in events {
            event.reduce(&mut snapshot);
        }
        snapshot
    }

    #[test]
    fn should_follow_playback_state_transitions() {
        let song: SongId = "song1".into();
        let cases = vec![
            (
                PlaybackEvent::StateChanged {
                    is_playing: true,
                    song_id: Some(song.clone()),
                },
                PlaybackState::Playing(song.clone()),
            ),
            (
                PlaybackEvent::StateChanged {
                    is_playing: false,
                    song_id: Some(song.clone()),
                },
                PlaybackState::Paused(song.clone()),
            ),
            (
                PlaybackEvent::StateChanged {
                    is_playing: true,
                    song_id: None,
                },
                PlaybackState::Idle,
            ),
        ];

        for (event, expected) in cases {
            assert_eq!(reduce_all(&[event]).playback_state, expected);
        }
    }

    #[test]
    fn should_return_to_idle_when_song_finishes() {
        let snapshot = reduce_all(&[
            PlaybackEvent::StateChanged {
                is_playing: true,
                song_id: Some("song1".into()),
            },
            PlaybackEvent::SongFinished,
        ]);

        assert_eq!(snapshot.playback_state, PlaybackState::Idle);
    }

    #[test]
    fn should_keep_playback_state_on_time_updates_and_remote_commands() {
        let snapshot = reduce_all(&[
            PlaybackEvent::StateChanged {
                is_playing: true,
                song_id: Some("song1".into()),
            },
            PlaybackEvent::TimeUpdated {
                current: 12.5,
                duration: 200.0,
            },
            PlaybackEvent::RemoteCommand(crate::RemoteCommand::Pause),
        ]);

        assert_eq!(snapshot.playback_state, PlaybackState::Playing("song1".into()));
        assert_eq!(
            snapshot.playback_time,
            Some(PlaybackTimeInfo {
                current: 12.5,
                duration: 200.0
            })
        );
    }

    #[test]
    fn should_track_signed_in_user() {
        let snapshot = reduce_all(&[AuthEvent::SignedIn("user1".into())]);
        assert_eq!(snapshot.auth_user_id, Some("user1".into()));

        let snapshot = reduce_all(&[AuthEvent::SignedIn("user1".into()), AuthEvent::SignedOut]);
        assert_eq!(snapshot.auth_user_id, None);
    }

    #[test]
    fn should_drop_download_progress_once_download_ends() {
        let snapshot = reduce_all(&[
            DownloadEvent::Started("song1".into()),
            DownloadEvent::Progress {
                song_id: "song1".into(),
                fraction: 0.5,
            },
            DownloadEvent::Progress {
                song_id: "song2".into(),
                fraction: 1.7,
            },
        ]);
        assert_eq!(snapshot.download_progress.get(&"song1".into()), Some(&0.5));
        assert_eq!(snapshot.download_progress.get(&"song2".into()), Some(&1.0));

        let snapshot = reduce_all(&[
            DownloadEvent::Started("song1".into()),
            DownloadEvent::SongDownloaded("song1".into()),
        ]);
        assert!(snapshot.download_progress.is_empty());
    }
}
