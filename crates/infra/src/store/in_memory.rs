use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use lectern_accounts::User;
use lectern_catalog::{Course, Module};
use lectern_core::{CourseId, ModuleId, Page, PageRequest, UserId};
use lectern_learning::{Enrollment, ModuleProgress};

use super::r#trait::{EnrolledCourse, LearningStore, StoreError, StoreResult, UnitOfWork};

/// Writes that can be made to fail on demand, to exercise rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    SaveUser,
    InsertEnrollment,
    UpsertProgress,
    SetModuleOrder,
    Commit,
}

#[derive(Debug, Default, Clone)]
struct State {
    users: HashMap<UserId, User>,
    courses: HashMap<CourseId, Course>,
    modules: HashMap<ModuleId, Module>,
    enrollments: HashMap<(UserId, CourseId), Enrollment>,
    progress: HashMap<(UserId, ModuleId), ModuleProgress>,
}

/// In-memory learning store.
///
/// Intended for tests/dev. Not optimized for performance: a unit of work holds
/// the store lock for its whole life and works on a copy of the data, which is
/// written back on commit.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLearningStore {
    state: Arc<Mutex<State>>,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `point` write fail with [`StoreError::Query`] until
    /// [`clear_failures`](Self::clear_failures) is called.
    pub fn fail_on(&self, point: FailPoint) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.insert(point);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.clear();
        }
    }
}

#[async_trait]
impl LearningStore for InMemoryLearningStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryUnitOfWork {
            guard,
            working,
            fail_points: self.fail_points.clone(),
        })
    }
}

/// Unit of work over [`InMemoryLearningStore`].
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    working: State,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl InMemoryUnitOfWork {
    fn check(&self, point: FailPoint) -> StoreResult<()> {
        let points = self
            .fail_points
            .lock()
            .map_err(|_| StoreError::Query("fail point lock poisoned".to_string()))?;
        if points.contains(&point) {
            return Err(StoreError::Query(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn module_ids_of(&self, course_id: CourseId) -> HashSet<ModuleId> {
        self.working
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .map(|m| m.id)
            .collect()
    }

    fn completed_in(&self, user_id: UserId, course_id: CourseId) -> Vec<ModuleId> {
        let modules = self.module_ids_of(course_id);
        self.working
            .progress
            .values()
            .filter(|p| p.user_id == user_id && p.is_completed && modules.contains(&p.module_id))
            .map(|p| p.module_id)
            .collect()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    // The whole state is already held for the life of the unit of work.
    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.find_user(id).await
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn identity_taken(
        &mut self,
        username: &str,
        email: &str,
        except: Option<UserId>,
    ) -> StoreResult<bool> {
        Ok(self.working.users.values().any(|u| {
            Some(u.id) != except && (u.username == username || u.email == email)
        }))
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.identity_taken(&user.username, &user.email, None).await? {
            return Err(StoreError::Duplicate(format!(
                "user {} or {} already exists",
                user.username, user.email
            )));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> StoreResult<()> {
        self.check(FailPoint::SaveUser)?;
        if self
            .identity_taken(&user.username, &user.email, Some(user.id))
            .await?
        {
            return Err(StoreError::Duplicate(format!(
                "user {} or {} already exists",
                user.username, user.email
            )));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete_user(&mut self, id: UserId) -> StoreResult<bool> {
        if self.working.users.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.enrollments.retain(|(user_id, _), _| *user_id != id);
        self.working.progress.retain(|(user_id, _), _| *user_id != id);
        Ok(true)
    }

    async fn list_users(&mut self, search: Option<&str>, page: PageRequest) -> StoreResult<Page<User>> {
        let mut users: Vec<User> = self
            .working
            .users
            .values()
            .filter(|u| search.is_none_or(|needle| u.matches_search(needle)))
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(Page::from_slice(users, page))
    }

    async fn count_users(&mut self) -> StoreResult<u64> {
        Ok(self.working.users.len() as u64)
    }

    async fn find_course(&mut self, id: CourseId) -> StoreResult<Option<Course>> {
        Ok(self.working.courses.get(&id).cloned())
    }

    async fn insert_course(&mut self, course: &Course) -> StoreResult<()> {
        if self.working.courses.contains_key(&course.id) {
            return Err(StoreError::Duplicate(format!("course {} already exists", course.id)));
        }
        self.working.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn save_course(&mut self, course: &Course) -> StoreResult<()> {
        self.working.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn delete_course(&mut self, id: CourseId) -> StoreResult<bool> {
        if self.working.courses.remove(&id).is_none() {
            return Ok(false);
        }
        let modules = self.module_ids_of(id);
        self.working.modules.retain(|_, m| m.course_id != id);
        self.working
            .progress
            .retain(|(_, module_id), _| !modules.contains(module_id));
        self.working.enrollments.retain(|(_, course_id), _| *course_id != id);
        Ok(true)
    }

    async fn list_courses(&mut self, search: Option<&str>, page: PageRequest) -> StoreResult<Page<Course>> {
        let mut courses: Vec<Course> = self
            .working
            .courses
            .values()
            .filter(|c| search.is_none_or(|needle| c.matches_search(needle)))
            .cloned()
            .collect();
        courses.sort_by_key(|c| (c.created_at, c.id));
        Ok(Page::from_slice(courses, page))
    }

    async fn count_courses(&mut self) -> StoreResult<u64> {
        Ok(self.working.courses.len() as u64)
    }

    async fn find_module(&mut self, id: ModuleId) -> StoreResult<Option<Module>> {
        Ok(self.working.modules.get(&id).cloned())
    }

    async fn insert_module(&mut self, module: &Module) -> StoreResult<()> {
        if self.working.modules.contains_key(&module.id) {
            return Err(StoreError::Duplicate(format!("module {} already exists", module.id)));
        }
        self.working.modules.insert(module.id, module.clone());
        Ok(())
    }

    async fn save_module(&mut self, module: &Module) -> StoreResult<()> {
        self.working.modules.insert(module.id, module.clone());
        Ok(())
    }

    async fn delete_module(&mut self, id: ModuleId) -> StoreResult<bool> {
        if self.working.modules.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.progress.retain(|(_, module_id), _| *module_id != id);
        Ok(true)
    }

    async fn list_modules(&mut self, course_id: CourseId, page: PageRequest) -> StoreResult<Page<Module>> {
        let mut modules: Vec<Module> = self
            .working
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| (m.order, m.created_at, m.id));
        Ok(Page::from_slice(modules, page))
    }

    async fn max_module_order(&mut self, course_id: CourseId) -> StoreResult<i32> {
        Ok(self
            .working
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .map(|m| m.order)
            .max()
            .unwrap_or(0))
    }

    async fn count_modules(&mut self, course_id: CourseId) -> StoreResult<u64> {
        Ok(self.module_ids_of(course_id).len() as u64)
    }

    async fn count_all_modules(&mut self) -> StoreResult<u64> {
        Ok(self.working.modules.len() as u64)
    }

    async fn set_module_order(
        &mut self,
        course_id: CourseId,
        module_id: ModuleId,
        order: i32,
    ) -> StoreResult<bool> {
        self.check(FailPoint::SetModuleOrder)?;
        match self.working.modules.get_mut(&module_id) {
            Some(module) if module.course_id == course_id => {
                module.order = order;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn module_orders(&mut self, course_id: CourseId) -> StoreResult<Vec<(ModuleId, i32)>> {
        let mut orders: Vec<(ModuleId, i32)> = self
            .working
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .map(|m| (m.id, m.order))
            .collect();
        orders.sort_by_key(|(id, order)| (*order, *id));
        Ok(orders)
    }

    async fn find_enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self.working.enrollments.get(&(user_id, course_id)).cloned())
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        self.check(FailPoint::InsertEnrollment)?;
        let key = (enrollment.user_id, enrollment.course_id);
        if self.working.enrollments.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "user {} already enrolled in course {}",
                enrollment.user_id, enrollment.course_id
            )));
        }
        self.working.enrollments.insert(key, enrollment.clone());
        Ok(())
    }

    async fn list_enrollments(
        &mut self,
        user_id: UserId,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<Page<EnrolledCourse>> {
        let mut rows: Vec<EnrolledCourse> = self
            .working
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                self.working.courses.get(&e.course_id).map(|course| EnrolledCourse {
                    enrollment: e.clone(),
                    course: course.clone(),
                })
            })
            .filter(|row| search.is_none_or(|needle| row.course.matches_enrolled_search(needle)))
            .collect();
        rows.sort_by(|a, b| {
            b.enrollment
                .purchased_at
                .cmp(&a.enrollment.purchased_at)
                .then_with(|| b.enrollment.id.cmp(&a.enrollment.id))
        });
        Ok(Page::from_slice(rows, page))
    }

    async fn count_enrollments(&mut self, user_id: UserId) -> StoreResult<u64> {
        Ok(self
            .working
            .enrollments
            .keys()
            .filter(|(owner, _)| *owner == user_id)
            .count() as u64)
    }

    async fn find_progress(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StoreResult<Option<ModuleProgress>> {
        Ok(self.working.progress.get(&(user_id, module_id)).cloned())
    }

    async fn upsert_progress(&mut self, progress: &ModuleProgress) -> StoreResult<()> {
        self.check(FailPoint::UpsertProgress)?;
        self.working
            .progress
            .insert((progress.user_id, progress.module_id), progress.clone());
        Ok(())
    }

    async fn count_completed_modules(&mut self, user_id: UserId, course_id: CourseId) -> StoreResult<u64> {
        Ok(self.completed_in(user_id, course_id).len() as u64)
    }

    async fn completed_module_ids(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StoreResult<Vec<ModuleId>> {
        Ok(self.completed_in(user_id, course_id))
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.check(FailPoint::Commit)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
