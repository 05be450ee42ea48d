//! `portal-auth` — pure authorization vocabulary for the portal.
//!
//! Roles, the signed-in user profile, static route policies and the
//! role-to-home mapping. No IO, no async.

pub mod authorize;
pub mod password;
pub mod roles;
pub mod routes;
pub mod user;

pub use authorize::{AuthorizationExplanation, AuthzError, RoutePolicy, authorize, explain_authorization};
pub use password::{MIN_PASSWORD_LENGTH, PasswordChange};
pub use roles::Role;
pub use routes::{
    home_route, is_login_view, is_platform_area, is_reserved_segment, is_rotation_route,
    login_route, platform_login_route, rotation_route,
};
pub use user::{LoginResponse, User, UserPatch};
