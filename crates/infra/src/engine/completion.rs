use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use lectern_auth::Principal;
use lectern_core::{CourseId, ModuleId};
use lectern_learning::{CourseCompleted, ModuleProgress};

use super::access::has_access;
use super::progress::course_progress;
use super::views::CompletionResult;
use super::{EngineError, EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, StoreResult, UnitOfWork};

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    /// Mark `module_id` complete for the caller and recompute course progress.
    ///
    /// Idempotent: completing an already-completed module rewrites the same
    /// row and keeps its first completion time. When the recomputed progress
    /// reaches 100% a certificate is issued after commit; issuance failure is
    /// logged and only leaves `certificate_url` empty.
    #[instrument(skip(self), fields(user_id = %principal.user_id, module_id = %module_id), err)]
    pub async fn complete_module(&self, principal: &Principal, module_id: ModuleId) -> EngineResult<CompletionResult> {
        let mut uow = self.store.begin().await?;

        let module = uow
            .find_module(module_id)
            .await?
            .ok_or_else(|| EngineError::not_found("module not found"))?;

        if !has_access(&mut uow, principal, module.course_id).await? {
            return Err(EngineError::forbidden("access denied. Course not purchased"));
        }

        let now = Utc::now();
        let row = match uow.find_progress(principal.user_id, module_id).await? {
            Some(mut existing) => {
                existing.mark_completed(now);
                existing
            }
            None => ModuleProgress::completed(principal.user_id, module_id, now),
        };
        uow.upsert_progress(&row).await?;

        let progress = course_progress(&mut uow, principal.user_id, module.course_id).await?;
        let completed = if progress.is_complete() {
            completion_event(&mut uow, principal, module.course_id, now).await?
        } else {
            None
        };

        uow.commit().await?;

        let certificate_url = match completed {
            Some(event) => {
                info!(course_id = %event.course_id, "course completed");
                self.issue_certificate(&event)
                    .await
                    .map(|reference| reference.into_string())
            }
            None => None,
        };

        Ok(CompletionResult {
            module_id,
            is_completed: true,
            course_progress: progress,
            certificate_url,
        })
    }
}

async fn completion_event<U: UnitOfWork>(
    uow: &mut U,
    principal: &Principal,
    course_id: CourseId,
    completed_at: DateTime<Utc>,
) -> StoreResult<Option<CourseCompleted>> {
    let Some(user) = uow.find_user(principal.user_id).await? else {
        warn!(user_id = %principal.user_id, "completing user has no account; skipping certificate");
        return Ok(None);
    };
    let Some(course) = uow.find_course(course_id).await? else {
        return Ok(None);
    };
    Ok(Some(CourseCompleted {
        user_id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        course_id: course.id,
        course_title: course.title,
        instructor: course.instructor,
        completed_at,
    }))
}
