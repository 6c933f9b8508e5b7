use lectern_auth::{Principal, Role};
use lectern_core::UserId;
use lectern_infra::engine::views::UserView;

/// Principal context for a request (authenticated identity + role).
///
/// Built by whatever authenticates the caller; the engine only ever sees the
/// [`Principal`] it yields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    role: Role,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.user_id, self.role)
    }
}

impl From<&UserView> for PrincipalContext {
    fn from(user: &UserView) -> Self {
        Self::new(user.id, Role::from_admin_flag(user.is_admin))
    }
}
