//! `portal-core` — shared building blocks for the portal session layer.
//!
//! This crate holds identifiers, the tenant slug value object, the error
//! taxonomy and the externally supplied configuration. No IO beyond reading
//! the environment.

pub mod config;
pub mod error;
pub mod id;
pub mod slug;
pub mod value_object;

pub use config::PortalConfig;
pub use error::{PortalError, PortalResult};
pub use id::{TenantId, UserId};
pub use slug::TenantSlug;
pub use value_object::ValueObject;
