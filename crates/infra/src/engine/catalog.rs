use std::collections::HashSet;

use chrono::Utc;
use tracing::{info, instrument};

use lectern_auth::{require_admin, Principal};
use lectern_catalog::{Course, CourseUpdate, Module, ModuleUpdate, NewCourse, NewModule};
use lectern_core::{CourseId, ModuleId, Page, PageRequest, UserId};
use lectern_learning::CourseProgress;

use super::access::has_access;
use super::progress::course_progress;
use super::views::{CourseView, EnrolledCourseView, ModuleView};
use super::{search_term, EngineError, EngineResult, EnrollmentEngine};
use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, UnitOfWork};

const COURSE_NOT_FOUND: &str = "course not found";
const MODULE_NOT_FOUND: &str = "module not found";
const NOT_PURCHASED: &str = "access denied. Course not purchased";

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    #[instrument(skip(self, new), fields(title = %new.title), err)]
    pub async fn create_course(&self, principal: &Principal, new: NewCourse) -> EngineResult<Course> {
        require_admin(principal)?;
        let course = Course::create(new, Utc::now())?;

        let mut uow = self.store.begin().await?;
        uow.insert_course(&course).await?;
        uow.commit().await?;

        info!(course_id = %course.id, "course created");
        Ok(course)
    }

    #[instrument(skip(self, update), fields(course_id = %course_id), err)]
    pub async fn update_course(
        &self,
        principal: &Principal,
        course_id: CourseId,
        update: CourseUpdate,
    ) -> EngineResult<Course> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        let mut course = uow
            .find_course(course_id)
            .await?
            .ok_or_else(|| EngineError::not_found(COURSE_NOT_FOUND))?;

        course.apply_update(update, Utc::now())?;
        uow.save_course(&course).await?;
        uow.commit().await?;
        Ok(course)
    }

    /// Delete a course with its modules, enrollments and progress.
    #[instrument(skip(self), fields(course_id = %course_id), err)]
    pub async fn delete_course(&self, principal: &Principal, course_id: CourseId) -> EngineResult<()> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        if !uow.delete_course(course_id).await? {
            return Err(EngineError::not_found(COURSE_NOT_FOUND));
        }
        uow.commit().await?;

        info!("course deleted");
        Ok(())
    }

    /// Append a module at the end of the course (`max(order) + 1`).
    #[instrument(skip(self, new), fields(course_id = %course_id), err)]
    pub async fn create_module(
        &self,
        principal: &Principal,
        course_id: CourseId,
        new: NewModule,
    ) -> EngineResult<Module> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        if uow.find_course(course_id).await?.is_none() {
            return Err(EngineError::not_found(COURSE_NOT_FOUND));
        }

        let current_max = uow.max_module_order(course_id).await?;
        let module = Module::create(course_id, new, current_max, Utc::now())?;
        uow.insert_module(&module).await?;
        uow.commit().await?;

        info!(module_id = %module.id, order = module.order, "module created");
        Ok(module)
    }

    #[instrument(skip(self, update), fields(module_id = %module_id), err)]
    pub async fn update_module(
        &self,
        principal: &Principal,
        module_id: ModuleId,
        update: ModuleUpdate,
    ) -> EngineResult<Module> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        let mut module = uow
            .find_module(module_id)
            .await?
            .ok_or_else(|| EngineError::not_found(MODULE_NOT_FOUND))?;

        module.apply_update(update, Utc::now())?;
        uow.save_module(&module).await?;
        uow.commit().await?;
        Ok(module)
    }

    /// Delete a module and every progress row that points at it.
    #[instrument(skip(self), fields(module_id = %module_id), err)]
    pub async fn delete_module(&self, principal: &Principal, module_id: ModuleId) -> EngineResult<()> {
        require_admin(principal)?;
        let mut uow = self.store.begin().await?;
        if !uow.delete_module(module_id).await? {
            return Err(EngineError::not_found(MODULE_NOT_FOUND));
        }
        uow.commit().await?;
        Ok(())
    }

    /// Catalog listing, searched over title and topics, annotated for the viewer.
    #[instrument(skip(self), fields(user_id = %viewer.user_id), err)]
    pub async fn list_courses(
        &self,
        viewer: &Principal,
        search: Option<&str>,
        page: PageRequest,
    ) -> EngineResult<Page<CourseView>> {
        let page = self.settings.page(page);
        let mut uow = self.store.begin().await?;
        let courses = uow.list_courses(search_term(search), page).await?;

        let mut items = Vec::with_capacity(courses.items.len());
        for course in courses.items {
            let is_purchased = uow.find_enrollment(viewer.user_id, course.id).await?.is_some();
            let progress = if is_purchased {
                course_progress(&mut uow, viewer.user_id, course.id).await?
            } else {
                CourseProgress::not_started(uow.count_modules(course.id).await?)
            };
            items.push(CourseView::new(course, progress, is_purchased));
        }
        uow.rollback().await?;

        Ok(Page {
            items,
            pagination: courses.pagination,
        })
    }

    #[instrument(skip(self), fields(user_id = %viewer.user_id, course_id = %course_id), err)]
    pub async fn course_detail(&self, viewer: &Principal, course_id: CourseId) -> EngineResult<CourseView> {
        let mut uow = self.store.begin().await?;
        let course = uow
            .find_course(course_id)
            .await?
            .ok_or_else(|| EngineError::not_found(COURSE_NOT_FOUND))?;

        let is_purchased = uow.find_enrollment(viewer.user_id, course_id).await?.is_some();
        let progress = if is_purchased {
            course_progress(&mut uow, viewer.user_id, course_id).await?
        } else {
            CourseProgress::not_started(uow.count_modules(course_id).await?)
        };
        uow.rollback().await?;

        Ok(CourseView::new(course, progress, is_purchased))
    }

    /// The viewer's purchased courses, newest purchase first, searched over
    /// title, instructor and topics.
    #[instrument(skip(self), fields(user_id = %viewer.user_id), err)]
    pub async fn my_courses(
        &self,
        viewer: &Principal,
        search: Option<&str>,
        page: PageRequest,
    ) -> EngineResult<Page<EnrolledCourseView>> {
        let page = self.settings.page(page);
        let mut uow = self.store.begin().await?;
        let enrolled = enrolled_views(&mut uow, viewer.user_id, search_term(search), page).await?;
        uow.rollback().await?;
        Ok(enrolled)
    }

    /// Modules of a course in position order. Requires access to the course.
    #[instrument(skip(self), fields(user_id = %viewer.user_id, course_id = %course_id), err)]
    pub async fn list_modules(
        &self,
        viewer: &Principal,
        course_id: CourseId,
        page: PageRequest,
    ) -> EngineResult<Page<ModuleView>> {
        let page = self.settings.page(page);
        let mut uow = self.store.begin().await?;
        if uow.find_course(course_id).await?.is_none() {
            return Err(EngineError::not_found(COURSE_NOT_FOUND));
        }
        if !has_access(&mut uow, viewer, course_id).await? {
            return Err(EngineError::forbidden(NOT_PURCHASED));
        }

        let completed: HashSet<ModuleId> = uow
            .completed_module_ids(viewer.user_id, course_id)
            .await?
            .into_iter()
            .collect();
        let modules = uow.list_modules(course_id, page).await?;
        uow.rollback().await?;

        Ok(modules.map(|module| {
            let done = completed.contains(&module.id);
            ModuleView::new(module, done)
        }))
    }

    /// One module. Requires access to its course; admins always see it as
    /// not completed.
    #[instrument(skip(self), fields(user_id = %viewer.user_id, module_id = %module_id), err)]
    pub async fn module_detail(&self, viewer: &Principal, module_id: ModuleId) -> EngineResult<ModuleView> {
        let mut uow = self.store.begin().await?;
        let module = uow
            .find_module(module_id)
            .await?
            .ok_or_else(|| EngineError::not_found(MODULE_NOT_FOUND))?;
        if !has_access(&mut uow, viewer, module.course_id).await? {
            return Err(EngineError::forbidden(NOT_PURCHASED));
        }

        let is_completed = if viewer.is_admin() {
            false
        } else {
            uow.find_progress(viewer.user_id, module_id)
                .await?
                .is_some_and(|p| p.is_completed)
        };
        uow.rollback().await?;

        Ok(ModuleView::new(module, is_completed))
    }
}

/// Enrolled courses of `user_id` with progress, one page.
pub(super) async fn enrolled_views<U: UnitOfWork>(
    uow: &mut U,
    user_id: UserId,
    search: Option<&str>,
    page: PageRequest,
) -> EngineResult<Page<EnrolledCourseView>> {
    let rows = uow.list_enrollments(user_id, search, page).await?;
    let mut items = Vec::with_capacity(rows.items.len());
    for row in rows.items {
        let progress = course_progress(&mut *uow, user_id, row.course.id).await?;
        items.push(EnrolledCourseView::new(&row.enrollment, row.course, progress));
    }
    Ok(Page {
        items,
        pagination: rows.pagination,
    })
}
