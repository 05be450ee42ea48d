use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::{Role, User};

/// Static access policy attached to a protected area.
///
/// An empty role set admits any authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    allowed_roles: BTreeSet<String>,
}

impl RoutePolicy {
    /// Admit any authenticated user.
    pub fn any() -> Self {
        Self::default()
    }

    /// Admit only the listed roles.
    pub fn only<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        Self {
            allowed_roles: roles
                .into_iter()
                .map(|r| r.into().as_str().to_string())
                .collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.allowed_roles.is_empty()
    }

    pub fn permits(&self, role: &Role) -> bool {
        self.is_open() || self.allowed_roles.contains(role.as_str())
    }

    pub fn allowed_roles(&self) -> impl Iterator<Item = &str> {
        self.allowed_roles.iter().map(String::as_str)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' is not allowed here")]
    Forbidden { role: Role },
}

/// Authorize a signed-in user against a route policy.
///
/// - No IO
/// - No panics
pub fn authorize(user: &User, policy: &RoutePolicy) -> Result<(), AuthzError> {
    if policy.permits(&user.role) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: user.role.clone(),
        })
    }
}

/// Why a policy check came out the way it did (for logs and debugging UIs).
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub role: String,
    pub granted: bool,
    pub allowed_roles: Vec<String>,
    pub reason: String,
}

pub fn explain_authorization(user: &User, policy: &RoutePolicy) -> AuthorizationExplanation {
    let allowed_roles: Vec<String> = policy.allowed_roles().map(str::to_string).collect();
    let granted = policy.permits(&user.role);
    let reason = if policy.is_open() {
        "area is open to any authenticated user".to_string()
    } else if granted {
        format!("role '{}' is listed by the area policy", user.role)
    } else {
        format!(
            "role '{}' is not among the allowed roles {:?}",
            user.role, allowed_roles
        )
    };

    AuthorizationExplanation {
        role: user.role.as_str().to_string(),
        granted,
        allowed_roles,
        reason,
    }
}
