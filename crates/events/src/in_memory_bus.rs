//! In-process signal bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::bus::{AuthSignal, SignalBus, SignalHandler, Subscription, Unsubscribe};

struct Slot<M> {
    next_id: AtomicU64,
    live: Mutex<Option<(u64, SignalHandler<M>)>>,
}

impl<M> Slot<M> {
    fn live(&self) -> MutexGuard<'_, Option<(u64, SignalHandler<M>)>> {
        // A panicking handler never runs under this lock, so the data is intact.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<M: 'static> Unsubscribe for Slot<M> {
    fn unsubscribe(&self, id: u64) {
        let mut live = self.live();
        if matches!(live.as_ref(), Some((current, _)) if *current == id) {
            *live = None;
        }
    }
}

/// In-memory single-subscriber bus.
///
/// - No IO / no async
/// - Delivery happens on the publisher's call stack
/// - The handler is invoked outside the registration lock, so it may publish
///   or resubscribe without deadlocking
pub struct InMemorySignalBus<M> {
    slot: Arc<Slot<M>>,
}

impl<M> Clone for InMemorySignalBus<M> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<M> Default for InMemorySignalBus<M> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Slot {
                next_id: AtomicU64::new(1),
                live: Mutex::new(None),
            }),
        }
    }
}

impl<M> InMemorySignalBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> core::fmt::Debug for InMemorySignalBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemorySignalBus")
            .field("subscribed", &self.slot.live().is_some())
            .finish()
    }
}

impl<M> SignalBus<M> for InMemorySignalBus<M>
where
    M: core::fmt::Debug + Send + 'static,
{
    fn publish(&self, message: M) -> bool {
        let handler = self.slot.live().as_ref().map(|(_, h)| Arc::clone(h));
        match handler {
            Some(handler) => {
                tracing::debug!(signal = ?message, "delivering signal");
                handler(message);
                true
            }
            None => {
                tracing::debug!(signal = ?message, "signal dropped: no live subscriber");
                false
            }
        }
    }

    fn subscribe(&self, handler: SignalHandler<M>) -> Subscription {
        let id = self.slot.next_id.fetch_add(1, Ordering::Relaxed);
        let displaced = self.slot.live().replace((id, handler));
        if let Some((old, _)) = displaced {
            tracing::warn!(displaced = old, subscription = id, "signal subscriber replaced");
        }
        let weak: Weak<dyn Unsubscribe> = Arc::downgrade(&self.slot) as Weak<dyn Unsubscribe>;
        Subscription::new(id, weak)
    }

    fn has_subscriber(&self) -> bool {
        self.slot.live().is_some()
    }
}

/// Handle used to broadcast and observe [`AuthSignal::Unauthorized`].
///
/// Construct one per process, hand clones to every collaborator that can see
/// a 401, and let the session manager subscribe.
pub type UnauthorizedSignal = InMemorySignalBus<AuthSignal>;

impl InMemorySignalBus<AuthSignal> {
    /// Broadcast that the backend rejected the current credential.
    pub fn broadcast_unauthorized(&self) -> bool {
        self.publish(AuthSignal::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> SignalHandler<AuthSignal> {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn publish_without_subscriber_is_dropped() {
        let signal = UnauthorizedSignal::new();
        assert!(!signal.broadcast_unauthorized());
    }

    #[test]
    fn delivers_to_live_subscriber_synchronously() {
        let signal = UnauthorizedSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _sub = signal.subscribe(counting_handler(&hits));

        assert!(signal.clone().broadcast_unauthorized());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let signal = UnauthorizedSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let sub = signal.subscribe(counting_handler(&hits));
        drop(sub);

        assert!(!signal.has_subscriber());
        assert!(!signal.broadcast_unauthorized());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn newer_subscriber_displaces_older() {
        let signal = UnauthorizedSignal::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let old = signal.subscribe(counting_handler(&first));
        let _new = signal.subscribe(counting_handler(&second));
        // The displaced registration must not remove the newer one.
        drop(old);

        signal.broadcast_unauthorized();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let signal = UnauthorizedSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = signal.clone();
        let counter = Arc::clone(&hits);
        let _sub = signal.subscribe(Arc::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                inner.broadcast_unauthorized();
            }
        }));

        signal.broadcast_unauthorized();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
