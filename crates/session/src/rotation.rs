//! Mandatory password rotation.
//!
//! While the signed-in user still carries an issued password, every route
//! other than the rotation route is replaced by it. Completing the rotation
//! ends the session: the token is cleared and the login view is loaded from
//! scratch, so no in-memory session survives.

use portal_auth::{PasswordChange, is_rotation_route, rotation_route};
use portal_core::{PortalError, PortalResult};

use crate::session::{SessionManager, SessionState};

/// How a successful rotation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Password changed; the login view is being loaded.
    Rotated,
    /// The backend rejected the credential; the session was ended instead.
    SessionEnded,
}

impl SessionManager {
    /// Apply the rotation rule to the current location.
    ///
    /// Returns `true` when a replacing navigation to the rotation route was
    /// issued.
    pub fn enforce_password_rotation(&self) -> bool {
        if !self.requires_password_rotation() {
            return false;
        }
        let path = self.navigator().location().path().to_string();
        if is_rotation_route(&path) {
            return false;
        }

        let target = rotation_route(&self.redirect_tenant());
        tracing::info!(from = %path, %target, "password rotation required");
        self.navigator().replace(&target);
        true
    }

    /// Submit the rotation form.
    ///
    /// The form is validated before any network call. Validation and backend
    /// rejections (`InvalidCredentials`, `PolicyViolation`) are returned for
    /// inline display; an `Unauthorized` answer ends the session instead.
    pub async fn complete_password_rotation(
        &self,
        form: &PasswordChange,
    ) -> PortalResult<RotationOutcome> {
        form.validate()?;

        let Some(token) = self.token() else {
            tracing::warn!("password rotation without a session");
            self.logout();
            return Ok(RotationOutcome::SessionEnded);
        };

        let result = self
            .inner
            .auth
            .change_password(&token, &form.current_password, &form.new_password)
            .await;

        match result {
            Ok(_) => {
                let target = self.login_path();
                self.inner.tokens.remove();
                self.begin(Some(SessionState::Anonymous));
                tracing::info!(%target, "password rotated; reloading login");
                self.navigator().hard_navigate(&target);
                Ok(RotationOutcome::Rotated)
            }
            Err(PortalError::Unauthorized) => {
                // A broadcasting transport may already have ended the session.
                if self.is_authenticated() {
                    self.logout();
                }
                Ok(RotationOutcome::SessionEnded)
            }
            Err(err) => {
                tracing::warn!(error = %err, "password rotation rejected");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use portal_auth::Role;
    use proptest::prelude::*;

    use super::*;
    use crate::ports::TokenStore;
    use crate::session::SessionStatus;
    use crate::testing::{Harness, NavEvent, user};

    fn form(current: &str, new: &str, confirm: &str) -> PasswordChange {
        PasswordChange::new(current, new, confirm)
    }

    async fn rotating(path: &str) -> Harness {
        let h = Harness::new(path)
            .with_stored_token("tok", user(Role::RESIDENT, false))
            .with_resolved_tenant("acme")
            .await;
        h.session.check_auth().await;
        h
    }

    #[tokio::test]
    async fn protected_route_is_replaced_by_rotation_route() {
        let h = rotating("/acme/resident").await;

        assert!(h.session.enforce_password_rotation());
        assert_eq!(h.nav.history(), vec![NavEvent::Replace("/acme/change-password".into())]);
        // Already there: nothing more to do.
        assert!(!h.session.enforce_password_rotation());
        assert_eq!(h.nav.history().len(), 1);
    }

    #[tokio::test]
    async fn mount_enforces_rotation() {
        let h = Harness::new("/acme/dashboard")
            .with_stored_token("tok", user(Role::ADMIN, false))
            .with_resolved_tenant("acme")
            .await;

        assert_eq!(h.session.mount().await, SessionStatus::PasswordRotationRequired);
        assert_eq!(h.nav.current_path(), "/acme/change-password");
    }

    #[tokio::test]
    async fn rotated_users_are_left_alone() {
        let h = Harness::new("/acme/resident").with_stored_token("tok", user(Role::RESIDENT, true));
        h.session.check_auth().await;
        assert!(!h.session.enforce_password_rotation());
        assert!(h.nav.history().is_empty());
    }

    #[tokio::test]
    async fn success_clears_token_and_reloads_login() {
        let h = rotating("/acme/change-password").await;

        let outcome = h
            .session
            .complete_password_rotation(&form("issued-pw", "brand-new-pw", "brand-new-pw"))
            .await
            .unwrap();

        assert_eq!(outcome, RotationOutcome::Rotated);
        assert_eq!(h.tokens.get(), None);
        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert_eq!(h.nav.last(), Some(NavEvent::Hard("/acme/login".into())));
        assert_eq!(
            h.auth.password_changes(),
            vec![("issued-pw".to_string(), "brand-new-pw".to_string())]
        );
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_backend() {
        let h = rotating("/acme/change-password").await;

        for bad in [
            form("", "brand-new-pw", "brand-new-pw"),
            form("issued-pw", "brand-new-pw", "different-pw"),
            form("issued-pw", "short", "short"),
        ] {
            let err = h.session.complete_password_rotation(&bad).await.unwrap_err();
            assert!(err.is_validation_failure(), "{err:?}");
        }
        assert!(h.auth.password_changes().is_empty());
        assert!(h.session.requires_password_rotation());
    }

    #[tokio::test]
    async fn backend_rejection_is_surfaced_and_session_kept() {
        let h = rotating("/acme/change-password").await;
        h.auth.fail_change_password(PortalError::invalid_credentials("incorrect password"));

        let err = h
            .session
            .complete_password_rotation(&form("wrong-pw", "brand-new-pw", "brand-new-pw"))
            .await
            .unwrap_err();

        assert_eq!(err, PortalError::invalid_credentials("incorrect password"));
        assert!(h.session.requires_password_rotation());
        assert_eq!(h.tokens.get().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn unauthorized_rejection_ends_session() {
        let h = rotating("/acme/change-password").await;
        h.auth.fail_change_password(PortalError::Unauthorized);

        let outcome = h
            .session
            .complete_password_rotation(&form("issued-pw", "brand-new-pw", "brand-new-pw"))
            .await
            .unwrap();

        assert_eq!(outcome, RotationOutcome::SessionEnded);
        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert_eq!(h.nav.last(), Some(NavEvent::Push("/acme/login".into())));
    }

    proptest! {
        /// Property: a user in rotation is sent to the rotation route from
        /// every other route.
        #[test]
        fn every_other_route_redirects_to_rotation(
            section in "[a-z]{1,10}",
            depth in 0usize..3,
        ) {
            prop_assume!(section != "change-password");
            let path = format!("/acme/{}", vec![section.as_str(); depth + 1].join("/"));

            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let h = rt.block_on(rotating(&path));

            prop_assert!(h.session.enforce_password_rotation());
            prop_assert_eq!(h.nav.last(), Some(NavEvent::Replace("/acme/change-password".into())));
        }
    }
}
