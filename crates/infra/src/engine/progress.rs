use tracing::instrument;

use lectern_core::{CourseId, UserId};
use lectern_learning::CourseProgress;

use super::{EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, StoreResult, UnitOfWork};

/// The single course-progress rule every read path goes through.
///
/// Completion rows count only when their module currently belongs to the
/// course, so deleted modules and other courses never leak in.
pub async fn course_progress<U>(uow: &mut U, user_id: UserId, course_id: CourseId) -> StoreResult<CourseProgress>
where
    U: UnitOfWork,
{
    let total = uow.count_modules(course_id).await?;
    let completed = uow.count_completed_modules(user_id, course_id).await?;
    Ok(CourseProgress::compute(total, completed))
}

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    /// Progress of `user_id` in `course_id`. Unknown ids simply yield zero counts.
    #[instrument(skip(self), fields(user_id = %user_id, course_id = %course_id), err)]
    pub async fn course_progress(&self, user_id: UserId, course_id: CourseId) -> EngineResult<CourseProgress> {
        let mut uow = self.store.begin().await?;
        let progress = course_progress(&mut uow, user_id, course_id).await?;
        uow.rollback().await?;
        Ok(progress)
    }
}
