use crate::broker::types::{
    BrokerConfig, ProviderStatus, SlotError, WaitOutcome, DEFAULT_QUOTA_BACKOFF, MAX_QUOTA_BACKOFF,
};
use crate::{Provider, SongId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

struct Waiter {
    ticket: u64,
    song_id: SongId,
    provider: Provider,
    sender: oneshot::Sender<WaitOutcome>,
}

#[derive(Default)]
struct BrokerState {
    active: HashMap<Provider, usize>,
    queue: VecDeque<Waiter>,
    quota_reset_at: HashMap<Provider, Instant>,
    next_ticket: u64,
    epoch: u64,
}

impl BrokerState {
    fn active(&self, provider: Provider) -> usize {
        self.active.get(&provider).copied().unwrap_or_default()
    }

    fn pending(&self, provider: Provider) -> usize {
        self.queue.iter().filter(|w| w.provider == provider).count()
    }

    /// Remaining backoff for the provider. Expired windows are dropped here.
    fn quota_window(&mut self, provider: Provider, now: Instant) -> Option<Duration> {
        match self.quota_reset_at.get(&provider) {
            Some(reset_at) if *reset_at > now => Some(*reset_at - now),
            Some(_) => {
                self.quota_reset_at.remove(&provider);
                debug!(%provider, "Quota window expired");
                None
            }
            None => None,
        }
    }
}

enum Admission {
    Granted { epoch: u64 },
    Queued {
        ticket: u64,
        receiver: oneshot::Receiver<WaitOutcome>,
    },
}

/// Per-provider admission control for downloads.
///
/// Every operation takes the state lock once and never holds it across an
/// await point. Callers that cannot be admitted immediately park on their own
/// oneshot channel until a released slot is handed to them.
pub struct SlotBroker {
    config: BrokerConfig,
    state: Mutex<BrokerState>,
}

impl SlotBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BrokerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for a download slot of the given provider.
    ///
    /// Returns immediately with [`SlotError::QuotaExceeded`] while the provider
    /// is backing off. Dropping the returned future withdraws the request from
    /// the queue.
    pub async fn request_slot(&self, song_id: &SongId, provider: Provider) -> Result<(), SlotError> {
        self.wait_for_slot(song_id, provider).await.map(|_| ())
    }

    /// Same as [`SlotBroker::request_slot`], but the slot is returned to the
    /// broker when the permit is dropped.
    pub async fn acquire(
        self: &Arc<Self>,
        song_id: &SongId,
        provider: Provider,
    ) -> Result<SlotPermit, SlotError> {
        let epoch = self.wait_for_slot(song_id, provider).await?;

        Ok(SlotPermit {
            broker: Arc::clone(self),
            provider,
            epoch,
        })
    }

    async fn wait_for_slot(&self, song_id: &SongId, provider: Provider) -> Result<u64, SlotError> {
        match self.admit(song_id, provider)? {
            Admission::Granted { epoch } => Ok(epoch),
            Admission::Queued { ticket, receiver } => {
                let mut pending = PendingSlot {
                    broker: self,
                    ticket,
                    provider,
                    receiver,
                    resolved: false,
                };

                pending.wait().await
            }
        }
    }

    fn admit(&self, song_id: &SongId, provider: Provider) -> Result<Admission, SlotError> {
        let mut state = self.lock();

        if let Some(retry_after) = state.quota_window(provider, Instant::now()) {
            debug!(%song_id, %provider, ?retry_after, "Provider is backing off, rejecting slot request");
            return Err(SlotError::QuotaExceeded {
                provider,
                retry_after,
            });
        }

        let limit = self.config.max_concurrent(provider);

        if state.active(provider) < limit {
            *state.active.entry(provider).or_default() += 1;
            debug!(%song_id, %provider, active = state.active(provider), limit, "Slot granted");
            return Ok(Admission::Granted { epoch: state.epoch });
        }

        if state
            .queue
            .iter()
            .any(|w| w.provider == provider && &w.song_id == song_id)
        {
            return Err(SlotError::AlreadyPending {
                song_id: song_id.clone(),
                provider,
            });
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let (sender, receiver) = oneshot::channel();
        state.queue.push_back(Waiter {
            ticket,
            song_id: song_id.clone(),
            provider,
            sender,
        });

        info!(%song_id, %provider, position = state.pending(provider), "Download queued");

        Ok(Admission::Queued { ticket, receiver })
    }

    /// Returns a slot of the provider and hands it to the oldest request
    /// queued for the same provider, if there is one.
    pub fn release_slot(&self, provider: Provider) {
        let mut state = self.lock();
        self.release_locked(&mut state, provider);
    }

    fn release_permit(&self, provider: Provider, epoch: u64) {
        let mut state = self.lock();

        if state.epoch != epoch {
            debug!(%provider, "Ignoring slot granted before the broker was reset");
            return;
        }

        self.release_locked(&mut state, provider);
    }

    fn release_locked(&self, state: &mut BrokerState, provider: Provider) {
        match state.active.get_mut(&provider) {
            Some(active) if *active > 0 => *active -= 1,
            _ => warn!(%provider, "Slot released while no download was active"),
        }

        let limit = self.config.max_concurrent(provider);

        while state.active(provider) < limit {
            let index = match state.queue.iter().position(|w| w.provider == provider) {
                Some(index) => index,
                None => break,
            };
            let waiter = match state.queue.remove(index) {
                Some(waiter) => waiter,
                None => break,
            };

            *state.active.entry(provider).or_default() += 1;

            let song_id = waiter.song_id;
            match waiter.sender.send(WaitOutcome::Granted { epoch: state.epoch }) {
                Ok(()) => {
                    debug!(%song_id, %provider, "Slot handed to queued download");
                    break;
                }
                Err(_) => {
                    // The waiter is gone, take the slot back and try the next one.
                    if let Some(active) = state.active.get_mut(&provider) {
                        *active -= 1;
                    }
                }
            }
        }
    }

    /// Starts a backoff window for the provider and fails every request queued for it.
    ///
    /// Downloads that already hold a slot are not affected.
    pub fn mark_quota_exceeded(&self, provider: Provider, retry_after: Option<Duration>) {
        let retry_after = retry_after
            .unwrap_or_else(|| self.config.quota_backoff())
            .min(MAX_QUOTA_BACKOFF);
        let now = Instant::now();
        let reset_at = now
            .checked_add(retry_after)
            .or_else(|| now.checked_add(DEFAULT_QUOTA_BACKOFF))
            .unwrap_or(now);
        let mut state = self.lock();

        state.quota_reset_at.insert(provider, reset_at);

        let (rejected, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.queue)
            .into_iter()
            .partition(|w| w.provider == provider);
        state.queue = kept;

        warn!(
            %provider,
            ?retry_after,
            rejected = rejected.len(),
            "Provider quota exceeded"
        );

        for waiter in rejected {
            let _ = waiter.sender.send(WaitOutcome::QuotaExceeded { retry_after });
        }
    }

    /// Removes the queued request of the song. Returns `false` when there was none.
    pub fn cancel_pending(&self, song_id: &SongId) -> bool {
        let mut state = self.lock();

        let index = match state.queue.iter().position(|w| &w.song_id == song_id) {
            Some(index) => index,
            None => return false,
        };

        match state.queue.remove(index) {
            Some(waiter) => {
                info!(%song_id, provider = %waiter.provider, "Queued download cancelled");
                let _ = waiter.sender.send(WaitOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    fn withdraw(&self, ticket: u64) -> bool {
        let mut state = self.lock();

        match state.queue.iter().position(|w| w.ticket == ticket) {
            Some(index) => {
                state.queue.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_quota_exceeded(&self, provider: Provider) -> bool {
        self.quota_retry_after(provider).is_some()
    }

    pub fn quota_retry_after(&self, provider: Provider) -> Option<Duration> {
        self.lock().quota_window(provider, Instant::now())
    }

    /// 1-based position of the song among the requests queued for the provider.
    pub fn queue_position(&self, song_id: &SongId, provider: Provider) -> Option<usize> {
        self.lock()
            .queue
            .iter()
            .filter(|w| w.provider == provider)
            .position(|w| &w.song_id == song_id)
            .map(|index| index + 1)
    }

    pub fn active_download_count(&self, provider: Provider) -> usize {
        self.lock().active(provider)
    }

    pub fn pending_download_count(&self, provider: Provider) -> usize {
        self.lock().pending(provider)
    }

    pub fn max_concurrent(&self, provider: Provider) -> usize {
        self.config.max_concurrent(provider)
    }

    pub fn provider_status(&self, provider: Provider) -> ProviderStatus {
        let mut state = self.lock();
        let quota_retry_after_secs = state
            .quota_window(provider, Instant::now())
            .map(|retry_after| retry_after.as_secs());

        ProviderStatus {
            provider,
            max_concurrent: self.config.max_concurrent(provider),
            active: state.active(provider),
            pending: state.pending(provider),
            quota_retry_after_secs,
        }
    }

    /// Cancels every queued request and forgets all counters and quota windows.
    pub fn reset(&self) {
        let mut state = self.lock();
        let waiters = std::mem::take(&mut state.queue);

        state.active.clear();
        state.quota_reset_at.clear();
        state.epoch += 1;

        info!(cancelled = waiters.len(), "Slot broker reset");

        for waiter in waiters {
            let _ = waiter.sender.send(WaitOutcome::Cancelled);
        }
    }
}

struct PendingSlot<'a> {
    broker: &'a SlotBroker,
    ticket: u64,
    provider: Provider,
    receiver: oneshot::Receiver<WaitOutcome>,
    resolved: bool,
}

impl PendingSlot<'_> {
    async fn wait(&mut self) -> Result<u64, SlotError> {
        let outcome = (&mut self.receiver).await;
        self.resolved = true;

        match outcome {
            Ok(WaitOutcome::Granted { epoch }) => Ok(epoch),
            Ok(WaitOutcome::QuotaExceeded { retry_after }) => Err(SlotError::QuotaExceeded {
                provider: self.provider,
                retry_after,
            }),
            Ok(WaitOutcome::Cancelled) | Err(_) => Err(SlotError::Cancelled),
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }

        if self.broker.withdraw(self.ticket) {
            debug!(provider = %self.provider, "Queued slot request dropped");
            return;
        }

        // A slot may have been handed over right before the caller went away.
        if let Ok(WaitOutcome::Granted { epoch }) = self.receiver.try_recv() {
            self.broker.release_permit(self.provider, epoch);
        }
    }
}

/// A granted download slot. Dropping it releases the slot exactly once.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct SlotPermit {
    broker: Arc<SlotBroker>,
    provider: Provider,
    epoch: u64,
}

impl SlotPermit {
    pub fn provider(&self) -> Provider {
        self.provider
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.broker.release_permit(self.provider, self.epoch);
    }
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit")
            .field("provider", &self.provider)
            .field("epoch", &self.epoch)
            .finish()
    }
}
