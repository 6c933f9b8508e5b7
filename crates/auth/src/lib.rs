//! `lectern-auth`: caller identity and the admin/user policy boundary.
//!
//! Authentication (credentials, tokens) happens upstream; this crate only
//! describes an already-resolved caller. It is intentionally decoupled from
//! HTTP and storage.

pub mod authorize;
pub mod principal;
pub mod roles;

pub use authorize::{require_admin, AuthzError};
pub use principal::Principal;
pub use roles::Role;
