use super::{
    CatalogStore, CatalogStoreError, DownloadError, DownloadPipeline, LocalFileRef, Transport,
    TransportError,
};
use crate::{BrokerConfig, DataChangeEvent, DownloadEvent, EventBus, Provider, SlotBroker, SongId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

struct CatalogStoreMock {
    providers: HashMap<SongId, Provider>,
    downloaded: Mutex<HashMap<SongId, LocalFileRef>>,
}

impl CatalogStoreMock {
    fn new() -> Self {
        let providers = [
            ("a", Provider::Mega),
            ("b", Provider::Mega),
            ("c", Provider::Mega),
            ("broken", Provider::Mega),
            ("limited", Provider::GoogleDrive),
            ("drive", Provider::GoogleDrive),
        ]
        .into_iter()
        .map(|(song_id, provider)| (SongId::from(song_id), provider))
        .collect();

        Self {
            providers,
            downloaded: Mutex::new(HashMap::new()),
        }
    }

    fn local_file(&self, song_id: &str) -> Option<LocalFileRef> {
        self.downloaded
            .lock()
            .unwrap()
            .get(&SongId::from(song_id))
            .cloned()
    }
}

#[async_trait]
impl CatalogStore for CatalogStoreMock {
    async fn get_song_provider(
        &self,
        song_id: &SongId,
    ) -> Result<Option<Provider>, CatalogStoreError> {
        Ok(self.providers.get(song_id).copied())
    }

    async fn mark_downloaded(
        &self,
        song_id: &SongId,
        local_file: &LocalFileRef,
    ) -> Result<(), CatalogStoreError> {
        self.downloaded
            .lock()
            .unwrap()
            .insert(song_id.clone(), local_file.clone());

        Ok(())
    }
}

/// Completes transfers immediately, except for songs listed in `gated`,
/// which wait until the test notifies them.
struct TransportMock {
    gated: HashMap<SongId, Arc<Notify>>,
    started: Mutex<Vec<SongId>>,
}

impl TransportMock {
    fn new() -> Self {
        Self {
            gated: HashMap::new(),
            started: Mutex::new(vec![]),
        }
    }

    fn with_gate(mut self, song_id: &str, gate: &Arc<Notify>) -> Self {
        self.gated.insert(song_id.into(), Arc::clone(gate));
        self
    }

    fn started(&self) -> Vec<SongId> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for TransportMock {
    async fn transfer(
        &self,
        song_id: &SongId,
        _provider: Provider,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<LocalFileRef, TransportError> {
        self.started.lock().unwrap().push(song_id.clone());

        if let Some(gate) = self.gated.get(song_id) {
            gate.notified().await;
        }

        match &**song_id {
            "broken" => Err(TransportError::Failed(Box::new(Error::from(
                ErrorKind::ConnectionReset,
            )))),
            "limited" => Err(TransportError::QuotaExceeded {
                retry_after: Some(Duration::from_secs(1800)),
            }),
            _ => {
                on_progress(0.5);
                on_progress(1.0);
                Ok(LocalFileRef(format!("downloads/{}", song_id)))
            }
        }
    }
}

struct Fixture {
    broker: Arc<SlotBroker>,
    bus: Arc<EventBus>,
    catalog: Arc<CatalogStoreMock>,
    transport: Arc<TransportMock>,
    pipeline: Arc<DownloadPipeline>,
}

fn create_fixture(transport: TransportMock) -> Fixture {
    create_fixture_with_config(BrokerConfig::default().with_limit(Provider::Mega, 1), transport)
}

fn create_fixture_with_config(config: BrokerConfig, transport: TransportMock) -> Fixture {
    let broker = Arc::new(SlotBroker::new(config));
    let bus = Arc::new(EventBus::new());
    let catalog = Arc::new(CatalogStoreMock::new());
    let transport = Arc::new(transport);
    let pipeline = Arc::new(DownloadPipeline::new(
        Arc::clone(&broker),
        Arc::clone(&bus),
        catalog.clone(),
        transport.clone(),
    ));

    Fixture {
        broker,
        bus,
        catalog,
        transport,
        pipeline,
    }
}

fn spawn_download(
    pipeline: &Arc<DownloadPipeline>,
    song_id: &str,
) -> actix_rt::task::JoinHandle<Result<LocalFileRef, DownloadError>> {
    let pipeline = Arc::clone(pipeline);
    let song_id = SongId::from(song_id);

    actix_rt::spawn(async move { pipeline.download_song(&song_id).await })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[actix_rt::test]
async fn test_downloading_song() {
    let fixture = create_fixture(TransportMock::new());
    let mut downloads = fixture.bus.subscribe_download();
    let mut data_changes = fixture.bus.subscribe_data_change();

    let local_file = fixture.pipeline.download_song(&"a".into()).await.unwrap();

    assert_eq!(local_file, LocalFileRef("downloads/a".into()));
    assert_eq!(fixture.catalog.local_file("a"), Some(local_file));
    assert_eq!(fixture.broker.active_download_count(Provider::Mega), 0);

    assert_eq!(downloads.try_recv(), Some(DownloadEvent::Started("a".into())));
    assert_eq!(
        downloads.try_recv(),
        Some(DownloadEvent::Progress {
            song_id: "a".into(),
            fraction: 0.5
        })
    );
    assert_eq!(
        downloads.try_recv(),
        Some(DownloadEvent::Progress {
            song_id: "a".into(),
            fraction: 1.0
        })
    );
    assert_eq!(
        downloads.try_recv(),
        Some(DownloadEvent::SongDownloaded("a".into()))
    );
    assert_eq!(data_changes.try_recv(), Some(DataChangeEvent::SongsUpdated));
    assert_eq!(fixture.bus.state().download_progress(&"a".into()), None);
}

#[actix_rt::test]
async fn test_unknown_song() {
    let fixture = create_fixture(TransportMock::new());

    let result = fixture.pipeline.download_song(&"missing".into()).await;

    assert!(matches!(result, Err(DownloadError::SongNotFound(_))));
    assert!(fixture.transport.started().is_empty());
}

#[actix_rt::test]
async fn test_transfer_failure_releases_slot() {
    let fixture = create_fixture(TransportMock::new());
    let mut downloads = fixture.bus.subscribe_download();

    let result = fixture.pipeline.download_song(&"broken".into()).await;

    assert!(matches!(result, Err(DownloadError::TransferFailed(_))));
    assert_eq!(fixture.broker.active_download_count(Provider::Mega), 0);
    assert_eq!(fixture.catalog.local_file("broken"), None);

    let events = std::iter::from_fn(|| downloads.try_recv()).collect::<Vec<_>>();
    assert!(!events
        .iter()
        .any(|event| matches!(event, DownloadEvent::SongDownloaded(_))));
    assert!(matches!(
        events.last(),
        Some(DownloadEvent::Failed { .. })
    ));
}

#[actix_rt::test]
async fn test_quota_fails_fast_without_transfer() {
    let fixture = create_fixture(TransportMock::new());

    fixture
        .broker
        .mark_quota_exceeded(Provider::Mega, Some(Duration::from_secs(3600)));

    let result = timeout(
        Duration::from_millis(50),
        fixture.pipeline.download_song(&"a".into()),
    )
    .await
    .unwrap();

    let error = result.unwrap_err();
    assert!(matches!(
        error,
        DownloadError::QuotaExceeded {
            provider: Provider::Mega,
            ..
        }
    ));
    assert!(error
        .user_message()
        .unwrap()
        .starts_with("quota exceeded, retry in "));
    assert!(fixture.transport.started().is_empty());
}

#[actix_rt::test]
async fn test_quota_reported_by_transport_blocks_provider() {
    let fixture = create_fixture(TransportMock::new());

    let result = fixture.pipeline.download_song(&"limited".into()).await;

    match result {
        Err(DownloadError::QuotaExceeded {
            provider,
            retry_after,
        }) => {
            assert_eq!(provider, Provider::GoogleDrive);
            assert!(retry_after > Duration::from_secs(1700));
        }
        other => panic!("Unexpected result: {:?}", other),
    }
    assert!(fixture.broker.is_quota_exceeded(Provider::GoogleDrive));
    assert!(!fixture.broker.is_quota_exceeded(Provider::Mega));
    assert_eq!(fixture.broker.active_download_count(Provider::GoogleDrive), 0);

    let result = fixture.pipeline.download_song(&"drive".into()).await;
    assert!(matches!(result, Err(DownloadError::QuotaExceeded { .. })));
    assert_eq!(fixture.transport.started(), vec![SongId::from("limited")]);
}

#[actix_rt::test]
async fn test_quota_reported_by_transport_fails_queued_download() {
    let gate = Arc::new(Notify::new());
    let fixture = create_fixture_with_config(
        BrokerConfig::default().with_limit(Provider::GoogleDrive, 1),
        TransportMock::new().with_gate("limited", &gate),
    );

    let limited = spawn_download(&fixture.pipeline, "limited");
    settle().await;
    let drive = spawn_download(&fixture.pipeline, "drive");
    settle().await;
    assert_eq!(fixture.broker.pending_download_count(Provider::GoogleDrive), 1);

    gate.notify_one();

    let result_limited = timeout(Duration::from_secs(1), limited)
        .await
        .unwrap()
        .unwrap();
    let result_drive = timeout(Duration::from_secs(1), drive)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(result_limited, Err(DownloadError::QuotaExceeded { .. })));
    assert!(matches!(result_drive, Err(DownloadError::QuotaExceeded { .. })));
    assert_eq!(fixture.transport.started(), vec![SongId::from("limited")]);
    assert_eq!(fixture.catalog.local_file("drive"), None);
    assert_eq!(fixture.broker.active_download_count(Provider::GoogleDrive), 0);
}

#[actix_rt::test]
async fn test_queued_downloads_run_in_order_and_quota_fails_the_rest() {
    let gate_a = Arc::new(Notify::new());
    let gate_b = Arc::new(Notify::new());
    let fixture = create_fixture(
        TransportMock::new()
            .with_gate("a", &gate_a)
            .with_gate("b", &gate_b),
    );
    let mut downloads = fixture.bus.subscribe_download();

    let song_a = spawn_download(&fixture.pipeline, "a");
    settle().await;
    let song_b = spawn_download(&fixture.pipeline, "b");
    settle().await;
    let song_c = spawn_download(&fixture.pipeline, "c");
    settle().await;

    assert_eq!(fixture.transport.started(), vec![SongId::from("a")]);
    assert_eq!(fixture.broker.pending_download_count(Provider::Mega), 2);

    gate_a.notify_one();
    song_a.await.unwrap().unwrap();
    settle().await;
    assert_eq!(
        fixture.transport.started(),
        vec![SongId::from("a"), SongId::from("b")]
    );

    fixture
        .broker
        .mark_quota_exceeded(Provider::Mega, Some(Duration::from_secs(3600)));
    let result_c = timeout(Duration::from_secs(1), song_c)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result_c, Err(DownloadError::QuotaExceeded { .. })));

    gate_b.notify_one();
    let result_b = timeout(Duration::from_secs(1), song_b)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result_b.unwrap(), LocalFileRef("downloads/b".into()));
    assert_eq!(fixture.broker.active_download_count(Provider::Mega), 0);

    let queued = std::iter::from_fn(|| downloads.try_recv())
        .filter_map(|event| match event {
            DownloadEvent::Queued { song_id, position } => Some((song_id, position)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        queued,
        vec![(SongId::from("b"), 1), (SongId::from("c"), 2)]
    );
}

#[actix_rt::test]
async fn test_cancelling_queued_download() {
    let gate_a = Arc::new(Notify::new());
    let fixture = create_fixture(TransportMock::new().with_gate("a", &gate_a));

    let song_a = spawn_download(&fixture.pipeline, "a");
    settle().await;
    let song_b = spawn_download(&fixture.pipeline, "b");
    settle().await;

    assert!(fixture.pipeline.cancel_download(&"b".into()));
    assert!(!fixture.pipeline.cancel_download(&"b".into()));

    let error = song_b.await.unwrap().unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(error.user_message(), None);

    gate_a.notify_one();
    song_a.await.unwrap().unwrap();
    assert_eq!(fixture.transport.started(), vec![SongId::from("a")]);
    assert_eq!(fixture.broker.active_download_count(Provider::Mega), 0);
}

#[actix_rt::test]
async fn test_aborted_transfer_releases_slot() {
    let gate_a = Arc::new(Notify::new());
    let fixture = create_fixture(TransportMock::new().with_gate("a", &gate_a));
    let mut downloads = fixture.bus.subscribe_download();

    let song_a = spawn_download(&fixture.pipeline, "a");
    settle().await;
    assert_eq!(fixture.broker.active_download_count(Provider::Mega), 1);
    assert_eq!(fixture.bus.state().download_progress(&"a".into()), Some(0.0));

    song_a.abort();
    assert!(song_a.await.is_err());

    assert_eq!(fixture.broker.active_download_count(Provider::Mega), 0);
    assert_eq!(fixture.bus.state().download_progress(&"a".into()), None);

    let events = std::iter::from_fn(|| downloads.try_recv()).collect::<Vec<_>>();
    assert_eq!(events.first(), Some(&DownloadEvent::Started("a".into())));
    assert!(matches!(
        events.last(),
        Some(DownloadEvent::Failed { song_id, .. }) if song_id == &SongId::from("a")
    ));

    fixture.pipeline.download_song(&"b".into()).await.unwrap();
}
