//! `portal-events` — process-wide authorization signals.
//!
//! Any collaborator that detects an authorization failure (an HTTP 401 from
//! any request) publishes [`AuthSignal::Unauthorized`] on an injected
//! [`UnauthorizedSignal`] handle. The session manager is the one live
//! subscriber and tears the session down in response.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{AuthSignal, SignalBus, SignalHandler, Subscription};
pub use in_memory_bus::{InMemorySignalBus, UnauthorizedSignal};
