use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for route gating.
///
/// Roles stay opaque strings at this layer so that a role the backend adds
/// later still deserializes; the well-known ones are associated constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Platform operator, outside any tenant.
    pub const SUPER_ADMIN: Role = Role(Cow::Borrowed("super_admin"));
    /// Estate administrator.
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const RESIDENT: Role = Role(Cow::Borrowed("resident"));
    pub const GUARD: Role = Role(Cow::Borrowed("guard"));
    /// Household member attached to a resident; has no portal home of its own.
    pub const FAMILY_MEMBER: Role = Role(Cow::Borrowed("family_member"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the role owns a dedicated sub-application.
    pub fn is_recognized(&self) -> bool {
        [Self::SUPER_ADMIN, Self::ADMIN, Self::RESIDENT, Self::GUARD].contains(self)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}
