//! Client-side checks for the password-rotation form.

use portal_core::{PortalError, PortalResult};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Input of the rotation form.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl core::fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PasswordChange").finish_non_exhaustive()
    }
}

impl PasswordChange {
    pub fn new(
        current_password: impl Into<String>,
        new_password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            current_password: current_password.into(),
            new_password: new_password.into(),
            confirm_password: confirm_password.into(),
        }
    }

    /// Reject the form before any network call is made.
    pub fn validate(&self) -> PortalResult<()> {
        if self.current_password.is_empty()
            || self.new_password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(PortalError::validation("please fill in all fields"));
        }
        if self.new_password != self.confirm_password {
            return Err(PortalError::validation("new passwords do not match"));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(PortalError::validation(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters long"
            )));
        }
        Ok(())
    }
}
