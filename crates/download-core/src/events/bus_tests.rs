use super::{
    AuthEvent, DataChangeEvent, DownloadEvent, EventBus, PlaybackEvent, PlaybackState,
    PlaybackTimeInfo,
};
use crate::SongId;
use futures_lite::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[test]
fn should_expose_playback_state_without_subscribers() {
    let bus = EventBus::new();
    let song_id: SongId = "song1".into();

    bus.emit_playback(PlaybackEvent::StateChanged {
        is_playing: true,
        song_id: Some(song_id.clone()),
    });

    assert_eq!(bus.playback_state(), PlaybackState::Playing(song_id));
}

#[test]
fn should_start_from_empty_snapshot() {
    let bus = EventBus::new();

    assert_eq!(bus.playback_state(), PlaybackState::Idle);
    assert_eq!(bus.playback_time(), None);
    assert_eq!(bus.last_data_event(), None);
    assert!(!bus.is_authenticated());
}

#[test]
fn should_update_auth_snapshot() {
    let bus = EventBus::new();

    bus.emit_auth(AuthEvent::SignedIn("user1".into()));
    assert!(bus.is_authenticated());
    assert_eq!(bus.auth_user_id(), Some("user1".into()));

    bus.emit_auth(AuthEvent::SignedOut);
    assert!(!bus.is_authenticated());
}

#[actix_rt::test]
async fn should_deliver_events_of_a_topic_to_every_subscriber() {
    let bus = EventBus::new();
    let mut first = bus.subscribe_data_change();
    let mut second = bus.subscribe_data_change();
    let mut other_topic = bus.subscribe_auth();

    bus.emit_data_change(DataChangeEvent::SongsUpdated);
    bus.emit_data_change(DataChangeEvent::SongDeleted("song1".into()));

    for subscription in [&mut first, &mut second] {
        assert_eq!(
            subscription.recv().await,
            Some(DataChangeEvent::SongsUpdated)
        );
        assert_eq!(
            subscription.recv().await,
            Some(DataChangeEvent::SongDeleted("song1".into()))
        );
    }
    assert_eq!(other_topic.try_recv(), None);
    assert_eq!(
        bus.last_data_event(),
        Some(DataChangeEvent::SongDeleted("song1".into()))
    );
}

#[actix_rt::test]
async fn should_only_deliver_events_emitted_after_subscribing() {
    let bus = EventBus::new();

    bus.emit_playback(PlaybackEvent::TimeUpdated {
        current: 1.0,
        duration: 10.0,
    });

    let mut subscription = bus.subscribe_playback();
    bus.emit_playback(PlaybackEvent::SongFinished);

    assert_eq!(subscription.next().await, Some(PlaybackEvent::SongFinished));
    assert_eq!(subscription.try_recv(), None);
    assert_eq!(
        bus.playback_time(),
        Some(PlaybackTimeInfo {
            current: 1.0,
            duration: 10.0
        })
    );
}

#[actix_rt::test]
async fn should_not_block_on_subscriber_that_never_drains() {
    let bus = EventBus::new();
    let _stalled = bus.subscribe_download();
    let mut active = bus.subscribe_download();

    for index in 0..10_000 {
        bus.emit_download(DownloadEvent::Progress {
            song_id: "song1".into(),
            fraction: index as f64 / 10_000.0,
        });
    }

    let first = timeout(Duration::from_secs(1), active.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.song_id(), &SongId::from("song1"));
}

#[actix_rt::test]
async fn should_preserve_emission_order_across_tasks() {
    let bus = Arc::new(EventBus::new());
    let mut subscription = bus.subscribe_download();

    let producer = {
        let bus = Arc::clone(&bus);
        actix_rt::spawn(async move {
            for index in 0..100 {
                bus.emit_download(DownloadEvent::Progress {
                    song_id: "song1".into(),
                    fraction: index as f64 / 100.0,
                });
            }
        })
    };
    producer.await.unwrap();

    let mut previous = -1.0;
    for _ in 0..100 {
        match subscription.recv().await {
            Some(DownloadEvent::Progress { fraction, .. }) => {
                assert!(fraction > previous);
                previous = fraction;
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}

#[actix_rt::test]
async fn should_unregister_subscription_when_consuming_task_ends() {
    let bus = Arc::new(EventBus::new());
    let subscription = bus.subscribe_auth();

    let consumer = actix_rt::spawn(async move {
        let mut subscription = subscription;
        subscription.recv().await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    bus.emit_auth(AuthEvent::SignedOut);
    assert_eq!(consumer.await.unwrap(), Some(AuthEvent::SignedOut));

    assert!(bus
        .subscriber_counts()
        .iter()
        .all(|(_, count)| *count == 0));
}

#[actix_rt::test]
async fn should_unregister_subscription_when_consuming_task_is_aborted() {
    let bus = Arc::new(EventBus::new());
    let mut subscription = bus.subscribe_playback();

    let consumer = actix_rt::spawn(async move { subscription.recv().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    consumer.abort();
    assert!(consumer.await.is_err());

    assert_eq!(bus.subscriber_counts()[2], ("playback", 0));
    bus.emit_playback(PlaybackEvent::SongFinished);
}

#[test]
fn should_keep_snapshot_in_line_with_delivered_events_under_concurrent_emitters() {
    let bus = Arc::new(EventBus::new());
    let mut subscription = bus.subscribe_data_change();

    let emitters = (0..4)
        .map(|thread| {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || {
                for index in 0..500 {
                    bus.emit_data_change(DataChangeEvent::SongDeleted(
                        format!("song-{}-{}", thread, index).into(),
                    ));
                }
            })
        })
        .collect::<Vec<_>>();

    for emitter in emitters {
        emitter.join().unwrap();
    }

    let delivered = std::iter::from_fn(|| subscription.try_recv()).collect::<Vec<_>>();
    assert_eq!(delivered.len(), 2000);
    assert_eq!(delivered.last().cloned(), bus.last_data_event());
}
