//! Signal publishing/subscription abstraction (mechanics only).
//!
//! Unlike a fan-out event bus, a signal bus delivers each message to the
//! single live subscriber, synchronously, on the publisher's turn. There is no
//! queue: a signal published while nobody listens is dropped.

use std::sync::{Arc, Weak};

/// Signals that force session-level reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthSignal {
    /// The backend rejected the current credential.
    Unauthorized,
}

impl AuthSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthSignal::Unauthorized => "unauthorized",
        }
    }
}

impl core::fmt::Display for AuthSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked on delivery.
pub type SignalHandler<M> = Arc<dyn Fn(M) + Send + Sync>;

/// Removes a registration when dropped.
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

/// Live registration on a [`SignalBus`].
///
/// Dropping the subscription unregisters the handler. A subscription that was
/// displaced by a newer one is inert: dropping it does not affect the newer
/// registration.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    id: u64,
    bus: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new(id: u64, bus: Weak<dyn Unsubscribe>) -> Self {
        Self { id, bus }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Single-subscriber publish/subscribe contract.
///
/// Implementations must be safe to share; publishers hold cheap clones of the
/// bus handle and call [`SignalBus::publish`] from wherever the failure is seen.
pub trait SignalBus<M>: Send + Sync {
    /// Deliver `message` to the live subscriber. Returns `true` if one was
    /// registered.
    fn publish(&self, message: M) -> bool;

    /// Register `handler` as the live subscriber, displacing any previous one.
    fn subscribe(&self, handler: SignalHandler<M>) -> Subscription;

    fn has_subscriber(&self) -> bool;
}

impl<M, B> SignalBus<M> for Arc<B>
where
    B: SignalBus<M> + ?Sized,
{
    fn publish(&self, message: M) -> bool {
        (**self).publish(message)
    }

    fn subscribe(&self, handler: SignalHandler<M>) -> Subscription {
        (**self).subscribe(handler)
    }

    fn has_subscriber(&self) -> bool {
        (**self).has_subscriber()
    }
}
