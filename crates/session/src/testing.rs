//! In-memory fakes for the session ports.
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! downstream crates that want to drive a [`SessionManager`] without a
//! browser or a backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use portal_auth::{LoginResponse, Role, User};
use portal_core::{PortalError, PortalResult, TenantId, TenantSlug, UserId};
use portal_events::UnauthorizedSignal;

use crate::location::Location;
use crate::ports::{AuthBackend, Navigator, TenantBackend, ThemePort, TokenStore};
use crate::session::{SessionManager, SessionPorts};
use crate::tenant::{Tenant, TenantResolver};
use crate::token_store::MemoryTokenStore;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Host used by [`Harness`]; has no tenant subdomain.
pub const TEST_HOST: &str = "portal.example";

pub fn tenant(id: i64, slug: &str, primary: Option<&str>, accent: Option<&str>) -> Tenant {
    Tenant {
        id: TenantId::new(id),
        name: format!("{slug} estate"),
        slug: TenantSlug::parse(slug).unwrap_or_default(),
        domain: None,
        is_active: true,
        logo_url: None,
        primary_color: primary.map(str::to_string),
        accent_color: accent.map(str::to_string),
        created_at: None,
        updated_at: None,
    }
}

/// User with `role`; `password_changed = false` puts them in rotation.
pub fn user(role: Role, password_changed: bool) -> User {
    let mut user = User::new(UserId::new(7), role, "Ada Obi");
    user.email = "ada@example.com".to_string();
    user.is_password_changed = password_changed;
    user
}

// ─────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    Push(String),
    Replace(String),
    Hard(String),
    Reload,
}

/// Navigator that records every navigation and moves its own location along.
#[derive(Debug)]
pub struct RecordingNavigator {
    location: Mutex<Location>,
    history: Mutex<Vec<NavEvent>>,
    deferred: Mutex<Option<Option<String>>>,
}

impl RecordingNavigator {
    /// # Panics
    /// If `host` and `path` do not form a valid URL.
    pub fn at(host: &str, path: &str) -> Self {
        Self {
            location: Mutex::new(Self::build(host, path)),
            history: Mutex::new(Vec::new()),
            deferred: Mutex::new(None),
        }
    }

    /// Record navigations without moving the location until
    /// [`settle`](Self::settle), like a router that applies them after the
    /// current render.
    pub fn defer(&self) {
        *lock(&self.deferred) = Some(None);
    }

    /// Apply the last deferred navigation, if any.
    pub fn settle(&self) {
        let pending = lock(&self.deferred).as_mut().and_then(Option::take);
        if let Some(path) = pending {
            let host = lock(&self.location).host().to_string();
            self.set_location(&host, &path);
        }
    }

    fn build(host: &str, path: &str) -> Location {
        Location::from_parts(host, path)
            .unwrap_or_else(|e| panic!("bad test location {host}{path}: {e}"))
    }

    /// Move the location without recording a navigation (user typed a URL).
    pub fn set_location(&self, host: &str, path: &str) {
        *lock(&self.location) = Self::build(host, path);
    }

    pub fn current_path(&self) -> String {
        lock(&self.location).path().to_string()
    }

    pub fn history(&self) -> Vec<NavEvent> {
        lock(&self.history).clone()
    }

    pub fn last(&self) -> Option<NavEvent> {
        lock(&self.history).last().cloned()
    }

    fn go(&self, event: NavEvent, path: &str) {
        lock(&self.history).push(event);
        if let Some(pending) = lock(&self.deferred).as_mut() {
            *pending = Some(path.to_string());
            return;
        }
        let host = lock(&self.location).host().to_string();
        *lock(&self.location) = Self::build(&host, path);
    }
}

impl Navigator for RecordingNavigator {
    fn location(&self) -> Location {
        lock(&self.location).clone()
    }

    fn push(&self, path: &str) {
        self.go(NavEvent::Push(path.to_string()), path);
    }

    fn replace(&self, path: &str) {
        self.go(NavEvent::Replace(path.to_string()), path);
    }

    fn hard_navigate(&self, path: &str) {
        self.go(NavEvent::Hard(path.to_string()), path);
    }

    fn reload(&self) {
        lock(&self.history).push(NavEvent::Reload);
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Theme
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingTheme {
    writes: Mutex<Vec<(String, String)>>,
}

impl RecordingTheme {
    /// Every write, in order.
    pub fn variables(&self) -> Vec<(String, String)> {
        lock(&self.writes).clone()
    }

    pub fn last_value(&self, name: &str) -> Option<String> {
        lock(&self.writes)
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

impl ThemePort for RecordingTheme {
    fn set_variable(&self, name: &str, value: &str) {
        lock(&self.writes).push((name.to_string(), value.to_string()));
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Tenant backend
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StubTenantBackend {
    tenants: Mutex<HashMap<String, Tenant>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: AtomicUsize,
}

impl StubTenantBackend {
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let backend = Self::default();
        for t in tenants {
            backend.insert(t);
        }
        backend
    }

    pub fn insert(&self, tenant: Tenant) {
        lock(&self.tenants).insert(tenant.slug.as_str().to_string(), tenant);
    }

    /// Answer requests for `slug` only after `by` has elapsed.
    pub fn delay(&self, slug: &str, by: Duration) {
        lock(&self.delays).insert(slug.to_string(), by);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantBackend for StubTenantBackend {
    async fn get_by_slug(&self, slug: &TenantSlug) -> PortalResult<Tenant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = lock(&self.delays).get(slug.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.tenants)
            .get(slug.as_str())
            .cloned()
            .ok_or(PortalError::NotFound)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Auth backend
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AuthScript {
    users: HashMap<String, User>,
    current_user_error: Option<PortalError>,
    change_password_error: Option<PortalError>,
    delay: Option<Duration>,
    issued_token: Option<String>,
    mfa: Option<(String, String)>,
}

/// Scriptable identity backend.
#[derive(Debug, Default)]
pub struct StubAuthBackend {
    script: Mutex<AuthScript>,
    calls: AtomicUsize,
    password_changes: Mutex<Vec<(String, String)>>,
}

impl StubAuthBackend {
    /// `token` identifies `user`.
    pub fn register(&self, token: &str, user: User) {
        lock(&self.script).users.insert(token.to_string(), user);
    }

    /// Every `current_user` call fails with `err`.
    pub fn fail_current_user(&self, err: PortalError) {
        lock(&self.script).current_user_error = Some(err);
    }

    pub fn fail_change_password(&self, err: PortalError) {
        lock(&self.script).change_password_error = Some(err);
    }

    /// Delay every `current_user` answer.
    pub fn delay(&self, by: Duration) {
        lock(&self.script).delay = Some(by);
    }

    /// Credential login answers with `token` directly.
    pub fn issue_token(&self, token: &str) {
        lock(&self.script).issued_token = Some(token.to_string());
    }

    /// Credential login answers with an MFA challenge `temp_token`, which
    /// `mfa_login` exchanges for `token`.
    pub fn require_mfa(&self, temp_token: &str, token: &str) {
        lock(&self.script).mfa = Some((temp_token.to_string(), token.to_string()));
    }

    /// Number of `current_user` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(current, new)` pairs received by `change_password`.
    pub fn password_changes(&self) -> Vec<(String, String)> {
        lock(&self.password_changes).clone()
    }
}

#[async_trait]
impl AuthBackend for StubAuthBackend {
    async fn current_user(&self, token: &str) -> PortalResult<User> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = lock(&self.script).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let script = lock(&self.script);
        if let Some(err) = &script.current_user_error {
            return Err(err.clone());
        }
        script.users.get(token).cloned().ok_or(PortalError::Unauthorized)
    }

    async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> PortalResult<User> {
        lock(&self.password_changes).push((current_password.to_string(), new_password.to_string()));
        let mut script = lock(&self.script);
        if let Some(err) = &script.change_password_error {
            return Err(err.clone());
        }
        let user = script.users.get_mut(token).ok_or(PortalError::Unauthorized)?;
        user.is_password_changed = true;
        Ok(user.clone())
    }

    async fn login(&self, _username: &str, _password: &str) -> PortalResult<LoginResponse> {
        let script = lock(&self.script);
        if let Some((temp, _)) = &script.mfa {
            return Ok(LoginResponse {
                mfa_required: true,
                temp_token: Some(temp.clone()),
                ..Default::default()
            });
        }
        script
            .issued_token
            .clone()
            .map(|token| LoginResponse {
                access_token: Some(token),
                token_type: Some("bearer".to_string()),
                ..Default::default()
            })
            .ok_or_else(|| PortalError::invalid_credentials("incorrect username or password"))
    }

    async fn mfa_login(&self, temp_token: &str, _code: &str) -> PortalResult<LoginResponse> {
        let script = lock(&self.script);
        match &script.mfa {
            Some((temp, token)) if temp == temp_token => Ok(LoginResponse {
                access_token: Some(token.clone()),
                token_type: Some("bearer".to_string()),
                ..Default::default()
            }),
            _ => Err(PortalError::invalid_credentials("invalid or expired code")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────

/// A session manager wired to fakes, with the tenant resolver as its
/// active-tenant source.
pub struct Harness {
    pub session: SessionManager,
    pub tenants: TenantResolver,
    pub nav: Arc<RecordingNavigator>,
    pub theme: Arc<RecordingTheme>,
    pub tokens: Arc<MemoryTokenStore>,
    pub auth: Arc<StubAuthBackend>,
    pub tenant_backend: Arc<StubTenantBackend>,
    pub signal: UnauthorizedSignal,
}

impl Harness {
    /// Harness whose browser sits at `path` (may carry a query) on [`TEST_HOST`].
    pub fn new(path: &str) -> Self {
        let nav = Arc::new(RecordingNavigator::at(TEST_HOST, path));
        let theme = Arc::new(RecordingTheme::default());
        let tokens = Arc::new(MemoryTokenStore::new());
        let auth = Arc::new(StubAuthBackend::default());
        let tenant_backend = Arc::new(StubTenantBackend::default());
        let signal = UnauthorizedSignal::new();

        let tenants = TenantResolver::new(tenant_backend.clone(), theme.clone(), nav.clone());
        let session = SessionManager::new(SessionPorts {
            tokens: tokens.clone(),
            auth: auth.clone(),
            navigator: nav.clone(),
            tenant: Arc::new(tenants.clone()),
            signal: signal.clone(),
        });

        Self {
            session,
            tenants,
            nav,
            theme,
            tokens,
            auth,
            tenant_backend,
            signal,
        }
    }

    /// Persist `token` and make the backend recognise it as `user`.
    pub fn with_stored_token(self, token: &str, user: User) -> Self {
        self.auth.register(token, user);
        self.tokens.set(token);
        self
    }

    /// Make `slug` a known tenant and resolve it.
    ///
    /// # Panics
    /// If resolution fails.
    pub async fn with_resolved_tenant(self, slug: &str) -> Self {
        self.tenant_backend.insert(tenant(1, slug, Some("#0a0a0a"), None));
        if let Err(e) = self.tenants.resolve(Some(slug)).await {
            panic!("tenant {slug} did not resolve: {e}");
        }
        self
    }
}
