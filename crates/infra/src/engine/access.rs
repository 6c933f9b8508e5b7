use tracing::instrument;

use lectern_auth::Principal;
use lectern_core::CourseId;

use super::{EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, StoreResult, UnitOfWork};

/// Whether `principal` may see the course's modules and record progress in it.
///
/// Admins always may; everyone else needs an enrollment. The course itself is
/// not looked up here.
pub async fn has_access<U>(uow: &mut U, principal: &Principal, course_id: CourseId) -> StoreResult<bool>
where
    U: UnitOfWork,
{
    if principal.is_admin() {
        return Ok(true);
    }
    Ok(uow
        .find_enrollment(principal.user_id, course_id)
        .await?
        .is_some())
}

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    #[instrument(skip(self), fields(user_id = %principal.user_id, course_id = %course_id), err)]
    pub async fn can_access_course(&self, principal: &Principal, course_id: CourseId) -> EngineResult<bool> {
        let mut uow = self.store.begin().await?;
        let allowed = has_access(&mut uow, principal, course_id).await?;
        uow.rollback().await?;
        Ok(allowed)
    }
}
