//! `portal-session`
//!
//! **Responsibility:** client-side authorization and multi-tenant session
//! control for the portal.
//!
//! This crate provides:
//! - Tenant resolution from ambient location, with slug-keyed caching and
//!   branding applied through a theme port
//! - The session lifecycle (restore, login, logout, forced logout on
//!   `unauthorized`, optimistic profile patches)
//! - The password-rotation interstitial
//! - Role-gated route guarding with a bounded loading state
//! - Token stores and, behind the `http` feature, `reqwest` collaborators
//!
//! Everything that touches the outside world is a port (see [`ports`]); the
//! session and tenant handles are constructed once and passed explicitly.

pub mod guard;
#[cfg(feature = "http")]
pub mod http;
pub mod location;
pub mod ports;
pub mod rotation;
pub mod session;
pub mod tenant;
pub mod token_store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use guard::{GuardView, RecoveryAction, RecoveryAffordance, RouteGuard};
#[cfg(feature = "http")]
pub use http::{ApiClient, HttpAuthBackend, HttpTenantBackend};
pub use location::Location;
pub use ports::{ActiveTenant, AuthBackend, Navigator, TenantBackend, ThemePort, TokenStore};
pub use rotation::RotationOutcome;
pub use session::{Session, SessionManager, SessionPorts, SessionState, SessionStatus, SignInOutcome};
pub use tenant::{SlugSource, Tenant, TenantResolver, TenantState, resolve_slug};
pub use token_store::{FileTokenStore, MemoryTokenStore};
