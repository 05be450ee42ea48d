//! Route vocabulary shared by the session manager and the route guard.

use portal_core::TenantSlug;

use crate::Role;

const PLATFORM_SEGMENT: &str = "platform";
const LOGIN_SEGMENT: &str = "login";
const ROTATION_SEGMENT: &str = "change-password";

/// Home of a role's sub-application within `tenant`.
///
/// Unrecognised roles land on `/`.
pub fn home_route(role: &Role, tenant: &TenantSlug) -> String {
    match role.as_str() {
        "super_admin" => "/platform".to_string(),
        "admin" => format!("/{tenant}/dashboard"),
        "resident" => format!("/{tenant}/resident"),
        "guard" => format!("/{tenant}/security"),
        _ => "/".to_string(),
    }
}

/// Tenant-scoped login, or the root login when no tenant is known.
pub fn login_route(tenant: Option<&TenantSlug>) -> String {
    match tenant {
        Some(slug) => format!("/{slug}/{LOGIN_SEGMENT}"),
        None => format!("/{LOGIN_SEGMENT}"),
    }
}

/// Login view of the platform-operator area.
pub fn platform_login_route() -> String {
    format!("/{PLATFORM_SEGMENT}/{LOGIN_SEGMENT}")
}

/// Mandatory password-rotation interstitial.
pub fn rotation_route(tenant: &TenantSlug) -> String {
    format!("/{tenant}/{ROTATION_SEGMENT}")
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty())
}

pub fn is_login_view(path: &str) -> bool {
    segments(path).last() == Some(LOGIN_SEGMENT)
}

pub fn is_rotation_route(path: &str) -> bool {
    segments(path).last() == Some(ROTATION_SEGMENT)
}

/// Whether `path` belongs to the platform-operator sub-application.
pub fn is_platform_area(path: &str) -> bool {
    segments(path).next() == Some(PLATFORM_SEGMENT)
}

/// First path segments that name an area rather than a tenant.
pub fn is_reserved_segment(segment: &str) -> bool {
    matches!(segment, PLATFORM_SEGMENT | LOGIN_SEGMENT)
}
