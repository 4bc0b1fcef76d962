use futures_lite::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Registry<E> {
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<E>)>,
}

fn lock<E>(registry: &Mutex<Registry<E>>) -> MutexGuard<'_, Registry<E>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out of one event type to any number of subscribers.
///
/// Each subscriber owns an unbounded queue, so a subscriber that stops
/// draining never blocks the sender or the other subscribers.
pub struct TypedChannel<E> {
    topic: &'static str,
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: Clone> TypedChannel<E> {
    pub fn new(topic: &'static str) -> Self {
        Self {
            topic,
            registry: Arc::new(Mutex::new(Registry {
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let id = SubscriptionId(Uuid::new_v4());
        let (sender, receiver) = mpsc::unbounded_channel();

        lock(&self.registry).subscribers.push((id.clone(), sender));

        trace!(topic = self.topic, subscription_id = %id, "Subscribed");

        Subscription {
            id,
            topic: self.topic,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers the event to every current subscriber in registration order.
    /// Returns the number of subscribers that received it.
    pub fn send(&self, event: E) -> usize {
        let mut registry = lock(&self.registry);

        registry
            .subscribers
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());

        registry.subscribers.len()
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        remove_subscriber(&self.registry, id)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

fn remove_subscriber<E>(registry: &Mutex<Registry<E>>, id: &SubscriptionId) -> bool {
    let mut registry = lock(registry);
    let before = registry.subscribers.len();

    registry.subscribers.retain(|(subscriber_id, _)| subscriber_id != id);

    registry.subscribers.len() != before
}

/// Receiving side of a [`TypedChannel`] subscription.
///
/// Dropping it removes the registration.
pub struct Subscription<E> {
    id: SubscriptionId,
    topic: &'static str,
    receiver: mpsc::UnboundedReceiver<E>,
    registry: Weak<Mutex<Registry<E>>>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Waits for the next event. Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl<E> Unpin for Subscription<E> {}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove_subscriber(&registry, &self.id);
            trace!(topic = self.topic, subscription_id = %self.id, "Unsubscribed");
        }
    }
}
