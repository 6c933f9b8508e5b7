use chrono::Utc;
use tracing::{info, instrument};

use lectern_core::{CourseId, UserId};
use lectern_learning::Enrollment;

use super::views::PurchaseReceipt;
use super::{EngineError, EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, StoreError, UnitOfWork};

const ALREADY_PURCHASED: &str = "course already purchased";

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    /// Buy `course_id` for `user_id`.
    ///
    /// Checks run in a fixed order (course exists, not already purchased, user
    /// exists, balance covers the price) so the first failing rule decides the
    /// error. The buyer's row stays locked until commit, so the balance check
    /// and the debit are atomic against other purchases by the same user. The
    /// debit and the enrollment commit together or not at all. A duplicate that
    /// still slips past the pre-check loses on the enrollment uniqueness
    /// constraint and is reported as the same conflict.
    #[instrument(skip(self), fields(user_id = %user_id, course_id = %course_id), err)]
    pub async fn purchase(&self, course_id: CourseId, user_id: UserId) -> EngineResult<PurchaseReceipt> {
        let mut uow = self.store.begin().await?;

        let course = uow
            .find_course(course_id)
            .await?
            .ok_or_else(|| EngineError::not_found("course not found"))?;

        // Lock the buyer before the duplicate check so concurrent purchases by
        // the same user see each other's debit and enrollment.
        let user = uow.lock_user(user_id).await?;

        if uow.find_enrollment(user_id, course_id).await?.is_some() {
            return Err(EngineError::conflict(ALREADY_PURCHASED));
        }

        let mut user = user.ok_or_else(|| EngineError::not_found("user not found"))?;

        let now = Utc::now();
        let balance = user.debit(course.price, now)?;
        uow.save_user(&user).await?;

        let enrollment = Enrollment::record(user_id, course_id, now);
        uow.insert_enrollment(&enrollment).await.map_err(|err| match err {
            StoreError::Duplicate(_) => EngineError::conflict(ALREADY_PURCHASED),
            other => other.into(),
        })?;

        uow.commit().await?;

        info!(
            enrollment_id = %enrollment.id,
            price = %course.price,
            balance = %balance,
            "course purchased"
        );
        Ok(PurchaseReceipt {
            course_id,
            user_balance: balance,
            transaction_id: enrollment.id,
        })
    }
}
