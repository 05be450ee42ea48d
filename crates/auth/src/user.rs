//! Signed-in user profile as returned by `/users/me`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use portal_core::UserId;

use crate::Role;

/// Authenticated user.
///
/// Replaced wholesale on login or restore; otherwise only changed through
/// [`UserPatch`] for optimistic local reflects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub full_name: String,

    /// `false` forces the password-rotation interstitial.
    pub is_password_changed: bool,

    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub house_address: Option<String>,
    #[serde(default)]
    pub mfa_enabled: Option<bool>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Accept both RFC 3339 timestamps and the offset-less form the backend emits.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

impl User {
    pub fn new(id: UserId, role: Role, full_name: impl Into<String>) -> Self {
        Self {
            id,
            role,
            full_name: full_name.into(),
            is_password_changed: true,
            email: String::new(),
            phone_number: None,
            is_active: true,
            created_at: None,
            house_address: None,
            mfa_enabled: None,
            profile_picture: None,
            profile_picture_url: None,
        }
    }

    pub fn requires_password_rotation(&self) -> bool {
        !self.is_password_changed
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &UserPatch) {
        patch.apply_to(self);
    }
}

/// Partial update merged into the current user without a network round trip.
///
/// `None` leaves a field untouched. Identity (`id`) and `role` are not
/// patchable; those change only through a fresh login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_password_changed: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(v) = &self.full_name {
            user.full_name = v.clone();
        }
        if let Some(v) = &self.email {
            user.email = v.clone();
        }
        if let Some(v) = &self.phone_number {
            user.phone_number = Some(v.clone());
        }
        if let Some(v) = &self.house_address {
            user.house_address = Some(v.clone());
        }
        if let Some(v) = self.mfa_enabled {
            user.mfa_enabled = Some(v);
        }
        if let Some(v) = &self.profile_picture {
            user.profile_picture = Some(v.clone());
        }
        if let Some(v) = &self.profile_picture_url {
            user.profile_picture_url = Some(v.clone());
        }
        if let Some(v) = self.is_password_changed {
            user.is_password_changed = v;
        }
    }
}

/// Answer to a credential sign-in.
///
/// Either an access token, or an MFA challenge carrying a short-lived token
/// that must be exchanged together with a one-time code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub mfa_required: bool,
    #[serde(default)]
    pub temp_token: Option<String>,
}
