use tracing::{info, instrument};

use lectern_auth::{require_admin, Principal};
use lectern_catalog::ModuleOrder;
use lectern_core::CourseId;

use super::views::ReorderResult;
use super::{EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, UnitOfWork};

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    /// Apply a batch of `(module, position)` pairs to one course in a single
    /// transaction.
    ///
    /// Pairs naming a module of another course match nothing and are skipped.
    /// Under the strict policy the request is validated first and the course's
    /// resulting ordering must have unique positions, otherwise nothing is
    /// written. Any storage failure rolls the whole batch back.
    #[instrument(skip(self, request), fields(course_id = %course_id, pairs = request.len()), err)]
    pub async fn reorder_modules(
        &self,
        principal: &Principal,
        course_id: CourseId,
        request: Vec<ModuleOrder>,
    ) -> EngineResult<ReorderResult> {
        require_admin(principal)?;
        let policy = self.settings.reorder_policy;
        policy.check_request(&request)?;

        let mut uow = self.store.begin().await?;
        let mut updated_modules = 0u32;
        for item in &request {
            if uow.set_module_order(course_id, item.module_id, item.order).await? {
                updated_modules += 1;
            }
        }

        let orders = uow.module_orders(course_id).await?;
        policy.check_result(&orders)?;
        uow.commit().await?;

        info!(updated_modules, "modules reordered");
        Ok(ReorderResult {
            course_id,
            module_order: request,
            updated_modules,
        })
    }
}
