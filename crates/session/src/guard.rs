//! Role-gated rendering of a protected subtree.
//!
//! The guard is evaluated on every render. It either renders the protected
//! children, shows a placeholder while the session is pending, or issues a
//! redirect and renders nothing. Protected children are never rendered while
//! a redirect is pending.

use std::time::Duration;

use tokio::time::Instant;

use portal_auth::{RoutePolicy, authorize, explain_authorization, is_rotation_route, rotation_route};
use portal_core::PortalConfig;
use portal_core::config::DEFAULT_LOADING_TIMEOUT;

use crate::session::{SessionManager, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Full reload of the current page.
    Reload,
    /// Clear the stored token and load the login view.
    ResetAndLogin,
}

/// Offered when loading outlasts the guard's loading timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAffordance {
    pub actions: [RecoveryAction; 2],
}

impl Default for RecoveryAffordance {
    fn default() -> Self {
        Self {
            actions: [RecoveryAction::Reload, RecoveryAction::ResetAndLogin],
        }
    }
}

/// What the guarded subtree should show for this evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// Session pending.
    Placeholder { recovery: Option<RecoveryAffordance> },
    /// A navigation to `to` is pending; render nothing.
    Redirecting { to: String },
    Render,
}

impl GuardView {
    pub fn renders_children(&self) -> bool {
        matches!(self, GuardView::Render)
    }
}

/// Checkpoint in front of one protected area.
#[derive(Debug)]
pub struct RouteGuard {
    session: SessionManager,
    policy: RoutePolicy,
    loading_timeout: Duration,
    loading_since: Option<Instant>,
    recovery_shown: bool,
    recovery_offers: usize,
    /// Redirect not yet applied by the navigator, as (path it was issued
    /// from, target).
    issued: Option<(String, String)>,
}

impl RouteGuard {
    pub fn new(session: SessionManager, policy: RoutePolicy) -> Self {
        Self {
            session,
            policy,
            loading_timeout: DEFAULT_LOADING_TIMEOUT,
            loading_since: None,
            recovery_shown: false,
            recovery_offers: 0,
            issued: None,
        }
    }

    pub fn from_config(session: SessionManager, policy: RoutePolicy, config: &PortalConfig) -> Self {
        Self::new(session, policy).with_loading_timeout(config.loading_timeout)
    }

    pub fn with_loading_timeout(mut self, timeout: Duration) -> Self {
        self.loading_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// How many times the recovery affordance has appeared.
    pub fn recovery_offers(&self) -> usize {
        self.recovery_offers
    }

    pub fn evaluate(&mut self) -> GuardView {
        let status = self.session.status();

        if status.is_pending() {
            return self.pending();
        }
        self.loading_since = None;
        self.recovery_shown = false;

        match status {
            SessionStatus::Anonymous => {
                let target = self.session.login_path();
                self.redirect(target)
            }
            SessionStatus::PasswordRotationRequired if !self.on_rotation_route() => {
                let target = rotation_route(&self.session.redirect_tenant());
                if self.first_issue(&target) {
                    self.session.enforce_password_rotation();
                    self.settle();
                }
                GuardView::Redirecting { to: target }
            }
            _ => self.check_role(),
        }
    }

    fn pending(&mut self) -> GuardView {
        let now = Instant::now();
        let since = *self.loading_since.get_or_insert(now);

        if now.duration_since(since) < self.loading_timeout {
            return GuardView::Placeholder { recovery: None };
        }
        if !self.recovery_shown {
            self.recovery_shown = true;
            self.recovery_offers += 1;
            tracing::warn!(
                waited_ms = now.duration_since(since).as_millis() as u64,
                "session still loading; offering recovery"
            );
        }
        GuardView::Placeholder {
            recovery: Some(RecoveryAffordance::default()),
        }
    }

    fn check_role(&mut self) -> GuardView {
        let Some(user) = self.session.user() else {
            // Signed out between the status read and now.
            let target = self.session.login_path();
            return self.redirect(target);
        };

        match authorize(&user, &self.policy) {
            Ok(()) => {
                self.issued = None;
                GuardView::Render
            }
            Err(denied) => {
                let explanation = explain_authorization(&user, &self.policy);
                tracing::warn!(reason = %explanation.reason, "{denied}");
                let target = self.session.home_path().unwrap_or_else(|| "/".to_string());
                self.redirect(target)
            }
        }
    }

    fn on_rotation_route(&self) -> bool {
        is_rotation_route(self.session.navigator().location().path())
    }

    fn redirect(&mut self, target: String) -> GuardView {
        if self.first_issue(&target) {
            let here = self.session.navigator().location().path().to_string();
            tracing::debug!(from = %here, to = %target, "guard redirect");
            self.session.navigator().push(&target);
            self.settle();
        }
        GuardView::Redirecting { to: target }
    }

    /// Record a redirect from the current path, unless the same one is
    /// still waiting on the navigator.
    fn first_issue(&mut self, target: &str) -> bool {
        let here = self.session.navigator().location().path().to_string();
        if here == target {
            return false;
        }
        if self.issued.as_ref().is_some_and(|(from, to)| *from == here && to == target) {
            return false;
        }
        self.issued = Some((here, target.to_string()));
        true
    }

    /// Forget the pending redirect once the location has left the path it
    /// was issued from. A user arriving back is redirected again.
    fn settle(&mut self) {
        let here = self.session.navigator().location().path().to_string();
        if self.issued.as_ref().is_some_and(|(from, _)| *from != here) {
            self.issued = None;
        }
    }

    /// Run one of the recovery actions offered by [`RecoveryAffordance`].
    pub fn recover(&mut self, action: RecoveryAction) {
        tracing::info!(?action, "loading recovery chosen");
        match action {
            RecoveryAction::Reload => self.session.navigator().reload(),
            RecoveryAction::ResetAndLogin => self.session.reset_to_login(),
        }
        self.loading_since = None;
        self.recovery_shown = false;
    }
}
