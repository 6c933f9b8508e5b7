use tracing::instrument;

use lectern_auth::{require_admin, Principal};
use lectern_core::PageRequest;

use super::catalog::enrolled_views;
use super::views::{AdminOverview, DashboardView};
use super::{EngineError, EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, UnitOfWork};

/// Enrolled courses shown on a learner's dashboard.
const DASHBOARD_COURSE_LIMIT: u32 = 100;

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    /// Balance, purchased courses with progress, and how many are finished.
    #[instrument(skip(self), fields(user_id = %viewer.user_id), err)]
    pub async fn dashboard(&self, viewer: &Principal) -> EngineResult<DashboardView> {
        let mut uow = self.store.begin().await?;
        let user = uow
            .find_user(viewer.user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))?;

        let page = PageRequest::first(DASHBOARD_COURSE_LIMIT);
        let enrolled = enrolled_views(&mut uow, viewer.user_id, None, page).await?;
        uow.rollback().await?;

        let completed_courses = enrolled.items.iter().filter(|c| c.is_completed).count() as u64;
        Ok(DashboardView {
            balance: user.balance,
            user: user.into(),
            total_enrolled: enrolled.pagination.total_items,
            enrolled_courses: enrolled.items,
            completed_courses,
        })
    }

    #[instrument(skip(self, principal), err)]
    pub async fn admin_overview(&self, principal: &Principal) -> EngineResult<AdminOverview> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        let overview = AdminOverview {
            total_users: uow.count_users().await?,
            total_courses: uow.count_courses().await?,
            total_modules: uow.count_all_modules().await?,
        };
        uow.rollback().await?;
        Ok(overview)
    }
}
