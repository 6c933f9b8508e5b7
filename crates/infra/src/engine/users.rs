use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use lectern_accounts::{NewUser, ProfileUpdate, User};
use lectern_auth::{require_admin, Principal, Role};
use lectern_core::{Page, PageRequest, UserId};

use super::views::{UserDetailView, UserView};
use super::{search_term, EngineError, EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, StoreError, UnitOfWork};

const USER_NOT_FOUND: &str = "user not found";
const IDENTITY_TAKEN: &str = "username or email already exists";

fn identity_conflict(err: StoreError) -> EngineError {
    match err {
        StoreError::Duplicate(_) => EngineError::conflict(IDENTITY_TAKEN),
        other => other.into(),
    }
}

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    /// Create a regular (non-admin) account with a zero balance.
    #[instrument(skip(self, new), fields(username = %new.username), err)]
    pub async fn register_user(&self, new: NewUser) -> EngineResult<UserView> {
        let user = User::register(new, Role::User, Utc::now())?;

        let mut uow = self.store.begin().await?;
        if uow.identity_taken(&user.username, &user.email, None).await? {
            return Err(EngineError::conflict(IDENTITY_TAKEN));
        }
        uow.insert_user(&user).await.map_err(identity_conflict)?;
        uow.commit().await?;

        info!(user_id = %user.id, "user registered");
        Ok(user.into())
    }

    /// Create the administrator account unless a user with that username
    /// exists. Returns the account and whether it was created.
    #[instrument(skip(self), err)]
    pub async fn ensure_admin(&self, username: &str, email: &str) -> EngineResult<(UserView, bool)> {
        let mut uow = self.store.begin().await?;
        if let Some(existing) = uow.find_user_by_username(username).await? {
            uow.rollback().await?;
            return Ok((existing.into(), false));
        }

        let admin = User::register(
            NewUser {
                username: username.to_string(),
                email: email.to_string(),
                first_name: "Admin".to_string(),
                last_name: "User".to_string(),
            },
            Role::Admin,
            Utc::now(),
        )?;
        uow.insert_user(&admin).await.map_err(identity_conflict)?;
        uow.commit().await?;

        info!(user_id = %admin.id, "admin account created");
        Ok((admin.into(), true))
    }

    /// Users searched over username, names and email.
    #[instrument(skip(self, principal), err)]
    pub async fn list_users(
        &self,
        principal: &Principal,
        search: Option<&str>,
        page: PageRequest,
    ) -> EngineResult<Page<UserView>> {
        require_admin(principal)?;
        let page = self.settings.page(page);
        let mut uow = self.store.begin().await?;
        let users = uow.list_users(search_term(search), page).await?;
        uow.rollback().await?;
        Ok(users.map(UserView::from))
    }

    #[instrument(skip(self, principal), fields(user_id = %user_id), err)]
    pub async fn user_detail(&self, principal: &Principal, user_id: UserId) -> EngineResult<UserDetailView> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        let user = uow
            .find_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(USER_NOT_FOUND))?;
        let courses_purchased = uow.count_enrollments(user_id).await?;
        uow.rollback().await?;

        Ok(UserDetailView {
            user: user.into(),
            courses_purchased,
        })
    }

    /// Add `increment` (possibly negative) to a user's balance, flooring at zero.
    #[instrument(skip(self, principal), fields(user_id = %user_id, increment = %increment), err)]
    pub async fn adjust_balance(
        &self,
        principal: &Principal,
        user_id: UserId,
        increment: Decimal,
    ) -> EngineResult<UserView> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        let mut user = uow
            .lock_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(USER_NOT_FOUND))?;

        let balance = user.adjust_balance(increment, Utc::now())?;
        uow.save_user(&user).await?;
        uow.commit().await?;

        info!(balance = %balance, "balance adjusted");
        Ok(user.into())
    }

    /// Replace a user's identity fields. Username and email stay unique.
    #[instrument(skip(self, principal, update), fields(user_id = %user_id), err)]
    pub async fn update_profile(
        &self,
        principal: &Principal,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> EngineResult<UserView> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        let mut user = uow
            .lock_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(USER_NOT_FOUND))?;

        if uow
            .identity_taken(&update.username, &update.email, Some(user_id))
            .await?
        {
            return Err(EngineError::conflict(IDENTITY_TAKEN));
        }
        user.apply_profile(update, Utc::now())?;
        uow.save_user(&user).await.map_err(identity_conflict)?;
        uow.commit().await?;
        Ok(user.into())
    }

    /// Delete a user with their enrollments and progress. The administrator
    /// account cannot be deleted.
    #[instrument(skip(self, principal), fields(user_id = %user_id), err)]
    pub async fn delete_user(&self, principal: &Principal, user_id: UserId) -> EngineResult<()> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        let user = uow
            .find_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(USER_NOT_FOUND))?;
        if user.username == self.settings.protected_username {
            return Err(EngineError::forbidden("cannot delete admin user"));
        }

        uow.delete_user(user_id).await?;
        uow.commit().await?;

        info!("user deleted");
        Ok(())
    }
}
