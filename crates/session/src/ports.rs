//! Collaborator contracts consumed by the session layer.
//!
//! Synchronous ports model browser-local facilities (storage, router,
//! style sheet); asynchronous ports model backend calls. No port carries a
//! timeout or retry of its own.

use async_trait::async_trait;

use portal_auth::{LoginResponse, User};
use portal_core::{PortalResult, TenantSlug};

use crate::location::Location;
use crate::tenant::Tenant;

/// Persisted credential slot, one per origin.
///
/// Reads and writes are not transactional; last write wins.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str);
    fn remove(&self);
}

/// Identity endpoints of the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Fetch the user owning `token`. Fails with `Unauthorized` for an
    /// invalid or expired token.
    async fn current_user(&self, token: &str) -> PortalResult<User>;

    /// Rotate the password of the user owning `token`.
    ///
    /// Fails with `InvalidCredentials` or `PolicyViolation`.
    async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> PortalResult<User>;

    /// Exchange username and password for a token or an MFA challenge.
    async fn login(&self, username: &str, password: &str) -> PortalResult<LoginResponse>;

    /// Exchange an MFA challenge token and one-time code for a token.
    async fn mfa_login(&self, temp_token: &str, code: &str) -> PortalResult<LoginResponse>;
}

/// Tenant directory of the backend.
#[async_trait]
pub trait TenantBackend: Send + Sync {
    /// Fails with `NotFound` when no tenant owns `slug`.
    async fn get_by_slug(&self, slug: &TenantSlug) -> PortalResult<Tenant>;
}

/// Client-side router plus the current location.
pub trait Navigator: Send + Sync {
    fn location(&self) -> Location;

    /// Soft navigation that appends a history entry.
    fn push(&self, path: &str);

    /// Soft navigation that replaces the current history entry.
    fn replace(&self, path: &str);

    /// Full page load of `path`; all in-memory state is discarded.
    fn hard_navigate(&self, path: &str);

    /// Full reload of the current page.
    fn reload(&self);
}

/// Single entry point for global theme side effects.
pub trait ThemePort: Send + Sync {
    fn set_variable(&self, name: &str, value: &str);
}

/// Read access to whichever tenant is currently resolved.
pub trait ActiveTenant: Send + Sync {
    fn resolved_slug(&self) -> Option<TenantSlug>;
}
