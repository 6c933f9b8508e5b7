use thiserror::Error;

use crate::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: admin role required")]
    AdminRequired,

    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

/// Gate admin-only operations (catalog edits, balance adjustments, reorders).
///
/// - No IO
/// - No panics
/// - Course-level access (enrollment) is decided by the engine, not here.
pub fn require_admin(principal: &Principal) -> Result<(), AuthzError> {
    if principal.is_admin() {
        Ok(())
    } else {
        tracing::debug!(user_id = %principal.user_id, "admin-only operation denied");
        Err(AuthzError::AdminRequired)
    }
}
