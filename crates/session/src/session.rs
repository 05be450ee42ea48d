//! Session lifecycle.
//!
//! ```text
//! UNINITIALIZED → LOADING → { AUTHENTICATED (⊃ PASSWORD_ROTATION_REQUIRED), ANONYMOUS }
//! any → ANONYMOUS   on logout, `unauthorized`, failed restore
//! ```
//!
//! Every asynchronous step takes a ticket from the session slot before it
//! suspends and may only write its result back while that ticket is still the
//! latest one. Logout, login, unmount and rotation each issue a new ticket, so
//! results belonging to an outdated trigger are discarded instead of
//! overwriting newer state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use portal_auth::{
    Role, User, UserPatch, home_route, is_login_view, is_platform_area, login_route,
    platform_login_route,
};
use portal_core::{PortalError, PortalResult, TenantSlug};
use portal_events::{AuthSignal, SignalBus, Subscription, UnauthorizedSignal};

use crate::ports::{ActiveTenant, AuthBackend, Navigator, TokenStore};
use crate::tenant::TENANT_QUERY_PARAM;

/// Authenticated session: the credential and the user it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Loading,
    Authenticated(Session),
    Anonymous,
}

/// Flattened view of [`SessionState`], including the rotation sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Uninitialized,
    Loading,
    Authenticated,
    PasswordRotationRequired,
    Anonymous,
}

impl SessionStatus {
    /// Whether the session is still waiting for a definitive answer.
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionStatus::Uninitialized | SessionStatus::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            SessionStatus::Authenticated | SessionStatus::PasswordRotationRequired
        )
    }
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Uninitialized => SessionStatus::Uninitialized,
            SessionState::Loading => SessionStatus::Loading,
            SessionState::Authenticated(s) if s.user.requires_password_rotation() => {
                SessionStatus::PasswordRotationRequired
            }
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
            SessionState::Anonymous => SessionStatus::Anonymous,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(s) => Some(s),
            _ => None,
        }
    }
}

/// Result of a credential sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    SignedIn,
    /// A second factor is required; pass `temp_token` to
    /// [`SessionManager::complete_mfa`].
    MfaRequired { temp_token: String },
}

/// Collaborators of a [`SessionManager`].
pub struct SessionPorts {
    pub tokens: Arc<dyn TokenStore>,
    pub auth: Arc<dyn AuthBackend>,
    pub navigator: Arc<dyn Navigator>,
    pub tenant: Arc<dyn ActiveTenant>,
    pub signal: UnauthorizedSignal,
}

#[derive(Default)]
struct SessionSlot {
    state: SessionState,
    ticket: u64,
}

pub(crate) struct SessionInner {
    pub(crate) tokens: Arc<dyn TokenStore>,
    pub(crate) auth: Arc<dyn AuthBackend>,
    pub(crate) navigator: Arc<dyn Navigator>,
    tenant: Arc<dyn ActiveTenant>,
    signal: UnauthorizedSignal,
    slot: Mutex<SessionSlot>,
    subscription: Mutex<Option<Subscription>>,
    restore_started: AtomicBool,
}

/// Shared handle owning the single session slot of the process.
///
/// Clone it into the route guard and anywhere else that needs session state;
/// every clone observes the same slot.
#[derive(Clone)]
pub struct SessionManager {
    pub(crate) inner: Arc<SessionInner>,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(ports: SessionPorts) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                tokens: ports.tokens,
                auth: ports.auth,
                navigator: ports.navigator,
                tenant: ports.tenant,
                signal: ports.signal,
                slot: Mutex::new(SessionSlot::default()),
                subscription: Mutex::new(None),
                restore_started: AtomicBool::new(false),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.inner.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.slot().state.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.slot().state.status()
    }

    pub fn user(&self) -> Option<User> {
        self.slot().state.session().map(|s| s.user.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.slot().state.session().map(|s| s.user.role.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.slot().state.session().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.status().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.status().is_pending()
    }

    pub fn requires_password_rotation(&self) -> bool {
        self.status() == SessionStatus::PasswordRotationRequired
    }

    /// Handle to inject into collaborators that can detect a 401.
    pub fn unauthorized_signal(&self) -> UnauthorizedSignal {
        self.inner.signal.clone()
    }

    pub(crate) fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ticketing
    // ─────────────────────────────────────────────────────────────────────

    /// Invalidate every in-flight result and optionally move to `state`.
    pub(crate) fn begin(&self, state: Option<SessionState>) -> u64 {
        let mut slot = self.slot();
        slot.ticket += 1;
        if let Some(state) = state {
            slot.state = state;
        }
        slot.ticket
    }

    /// Write `state` if `ticket` is still the latest. Returns whether it was written.
    pub(crate) fn commit(&self, ticket: u64, state: SessionState) -> bool {
        let mut slot = self.slot();
        if slot.ticket != ticket {
            tracing::warn!(
                ticket,
                latest = slot.ticket,
                "discarding stale session result"
            );
            return false;
        }
        slot.state = state;
        true
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.slot().ticket == ticket
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tenant helpers
    // ─────────────────────────────────────────────────────────────────────

    fn query_tenant(&self) -> Option<TenantSlug> {
        self.inner
            .navigator
            .location()
            .query(TENANT_QUERY_PARAM)
            .and_then(|raw| TenantSlug::parse(raw).ok())
    }

    /// Tenant known to the session: the resolved one, else a `?tenant=` override.
    pub fn known_tenant(&self) -> Option<TenantSlug> {
        self.inner
            .tenant
            .resolved_slug()
            .or_else(|| self.query_tenant())
    }

    /// Tenant used to build redirect targets; falls back to `"default"`.
    pub fn redirect_tenant(&self) -> TenantSlug {
        self.known_tenant().unwrap_or_default()
    }

    /// Login view for the current tenant (root login if none is known).
    pub fn login_path(&self) -> String {
        login_route(self.known_tenant().as_ref())
    }

    /// Home of the signed-in user's role, if signed in.
    pub fn home_path(&self) -> Option<String> {
        self.role().map(|role| home_route(&role, &self.redirect_tenant()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Mount the provider: subscribe to `unauthorized` (once), restore the
    /// stored session (once), then enforce the rotation rule.
    pub async fn mount(&self) -> SessionStatus {
        self.subscribe_unauthorized();
        self.check_auth().await;
        self.enforce_password_rotation();
        self.status()
    }

    /// Drop the signal subscription and invalidate in-flight results.
    pub fn unmount(&self) {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        self.begin(None);
        tracing::debug!("session provider unmounted");
    }

    fn subscribe_unauthorized(&self) {
        let mut subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if subscription.is_some() {
            return;
        }

        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        *subscription = Some(self.inner.signal.subscribe(Arc::new(move |signal: AuthSignal| {
            if let Some(inner) = weak.upgrade() {
                SessionManager { inner }.on_signal(signal);
            }
        })));
    }

    fn on_signal(&self, signal: AuthSignal) {
        match signal {
            AuthSignal::Unauthorized => {
                let path = self.inner.navigator.location().path().to_string();
                if is_login_view(&path) {
                    tracing::debug!(%path, "ignoring unauthorized signal on login view");
                    return;
                }
                tracing::warn!(%path, "unauthorized signal received; ending session");
                self.logout();
            }
        }
    }

    /// Restore the session from the stored token.
    ///
    /// Runs at most once per provider lifetime and never fails outward: any
    /// backend failure clears the stored token and leaves the session anonymous.
    pub async fn check_auth(&self) {
        if self.inner.restore_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let ticket = self.begin(Some(SessionState::Loading));
        let Some(token) = self.inner.tokens.get() else {
            tracing::debug!("no stored token; session is anonymous");
            self.commit(ticket, SessionState::Anonymous);
            return;
        };

        match self.inner.auth.current_user(&token).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, role = %user.role, "session restored");
                self.commit(ticket, SessionState::Authenticated(Session { token, user }));
            }
            Err(err) => {
                tracing::error!(error = %err, "session restore failed");
                if self.is_current(ticket) {
                    self.inner.tokens.remove();
                    self.commit(ticket, SessionState::Anonymous);
                }
            }
        }
    }

    /// Establish a session from `token`.
    ///
    /// When `user` is `None` it is fetched. A user that must rotate their
    /// password is sent to the rotation route instead of their home; otherwise,
    /// with `redirect`, navigation goes to the role's home.
    pub async fn login(&self, token: &str, user: Option<User>, redirect: bool) -> PortalResult<()> {
        self.inner.tokens.set(token);

        let (ticket, user) = match user {
            Some(user) => (self.begin(None), user),
            None => {
                let ticket = self.begin(Some(SessionState::Loading));
                match self.inner.auth.current_user(token).await {
                    Ok(user) => (ticket, user),
                    Err(err) => {
                        tracing::error!(error = %err, "login failed to load user");
                        if self.is_current(ticket) {
                            self.inner.tokens.remove();
                            self.commit(ticket, SessionState::Anonymous);
                        }
                        return Err(err);
                    }
                }
            }
        };

        let role = user.role.clone();
        let rotate = user.requires_password_rotation();
        let session = Session {
            token: token.to_string(),
            user,
        };
        if !self.commit(ticket, SessionState::Authenticated(session)) {
            return Ok(());
        }
        tracing::info!(role = %role, rotate, "logged in");

        if rotate {
            self.enforce_password_rotation();
        } else if redirect {
            let target = home_route(&role, &self.redirect_tenant());
            self.inner.navigator.push(&target);
        }
        Ok(())
    }

    /// End the session and navigate to the appropriate login view.
    pub fn logout(&self) {
        self.inner.tokens.remove();
        self.begin(Some(SessionState::Anonymous));

        let path = self.inner.navigator.location().path().to_string();
        let target = if is_platform_area(&path) {
            platform_login_route()
        } else {
            self.login_path()
        };
        tracing::info!(%target, "logged out");
        self.inner.navigator.push(&target);
    }

    /// Merge `patch` into the current user without a network round trip.
    ///
    /// Returns `false` when there is no signed-in user.
    pub fn update_user(&self, patch: &UserPatch) -> bool {
        let mut slot = self.slot();
        match &mut slot.state {
            SessionState::Authenticated(session) => {
                session.user.apply(patch);
                tracing::debug!(user_id = %session.user.id, "user updated locally");
                true
            }
            _ => false,
        }
    }

    /// Sign in with credentials; completes with [`Self::login`] unless a second
    /// factor is required.
    pub async fn sign_in(&self, username: &str, password: &str) -> PortalResult<SignInOutcome> {
        let response = self.inner.auth.login(username, password).await?;
        self.finish_sign_in(response.access_token, response.mfa_required, response.temp_token)
            .await
    }

    /// Finish an MFA challenge started by [`Self::sign_in`].
    pub async fn complete_mfa(&self, temp_token: &str, code: &str) -> PortalResult<SignInOutcome> {
        let response = self.inner.auth.mfa_login(temp_token, code).await?;
        self.finish_sign_in(response.access_token, response.mfa_required, response.temp_token)
            .await
    }

    async fn finish_sign_in(
        &self,
        access_token: Option<String>,
        mfa_required: bool,
        temp_token: Option<String>,
    ) -> PortalResult<SignInOutcome> {
        if mfa_required {
            let temp_token = temp_token
                .ok_or_else(|| PortalError::unexpected("mfa challenge without temp_token"))?;
            return Ok(SignInOutcome::MfaRequired { temp_token });
        }
        let token = access_token
            .ok_or_else(|| PortalError::unexpected("login response without access_token"))?;
        self.login(&token, None, true).await?;
        Ok(SignInOutcome::SignedIn)
    }

    /// Clear the stored token and force a full page load of the login view.
    ///
    /// Recovery path for a session stuck in loading.
    pub fn reset_to_login(&self) {
        self.inner.tokens.remove();
        self.begin(Some(SessionState::Anonymous));
        let target = self.login_path();
        tracing::warn!(%target, "session reset by user");
        self.inner.navigator.hard_navigate(&target);
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: SessionState) {
        self.begin(Some(state));
    }
}
