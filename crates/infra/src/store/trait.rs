use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lectern_accounts::User;
use lectern_catalog::{Course, Module};
use lectern_core::{CourseId, ModuleId, Page, PageRequest, UserId};
use lectern_learning::{Enrollment, ModuleProgress};

/// Storage operation error.
///
/// These are **infrastructure errors** (connectivity, constraint hits, row
/// decoding) as opposed to domain errors. The engine decides what each one means
/// for the caller; only `Duplicate` is ever translated into a domain conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("storage connection failed: {0}")]
    Connection(String),

    #[error("storage query failed: {0}")]
    Query(String),

    #[error("failed to decode stored row: {0}")]
    Decode(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An enrollment joined with the course it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolledCourse {
    pub enrollment: Enrollment,
    pub course: Course,
}

/// Transactional storage for users, the catalog, enrollments and progress.
///
/// Every engine operation runs inside exactly one [`UnitOfWork`] obtained from
/// [`LearningStore::begin`]. Multi-step mutations (purchase, completion,
/// reorder, cascading deletes) therefore commit or roll back as a whole.
///
/// ## Implementation Requirements
///
/// - Writes made through a unit of work are visible to later reads on the same
///   unit of work, and to nobody else until `commit`.
/// - Dropping a unit of work without committing discards its writes.
/// - `(user, course)` enrollments and `(user, module)` progress rows are unique;
///   a second insert fails with [`StoreError::Duplicate`].
/// - Deleting a user, course or module removes everything that references it.
#[async_trait]
pub trait LearningStore: Send + Sync {
    type Tx: UnitOfWork;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

#[async_trait]
impl<S> LearningStore for Arc<S>
where
    S: LearningStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        (**self).begin().await
    }
}

/// One atomic batch of reads and writes.
///
/// Listing methods take an already-bounded [`PageRequest`] and return items in
/// a stable order: courses and users by creation time, modules by `order`,
/// enrollments newest purchase first. `search` is a case-insensitive substring.
#[async_trait]
pub trait UnitOfWork: Send {
    // users
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>>;
    /// Load a user and hold the row until this unit of work ends, so balance
    /// and profile changes by concurrent units of work queue behind it.
    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>>;
    /// Whether a user other than `except` already holds `username` or `email`.
    async fn identity_taken(
        &mut self,
        username: &str,
        email: &str,
        except: Option<UserId>,
    ) -> StoreResult<bool>;
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    async fn save_user(&mut self, user: &User) -> StoreResult<()>;
    async fn delete_user(&mut self, id: UserId) -> StoreResult<bool>;
    async fn list_users(&mut self, search: Option<&str>, page: PageRequest) -> StoreResult<Page<User>>;
    async fn count_users(&mut self) -> StoreResult<u64>;

    // courses
    async fn find_course(&mut self, id: CourseId) -> StoreResult<Option<Course>>;
    async fn insert_course(&mut self, course: &Course) -> StoreResult<()>;
    async fn save_course(&mut self, course: &Course) -> StoreResult<()>;
    async fn delete_course(&mut self, id: CourseId) -> StoreResult<bool>;
    async fn list_courses(&mut self, search: Option<&str>, page: PageRequest) -> StoreResult<Page<Course>>;
    async fn count_courses(&mut self) -> StoreResult<u64>;

    // modules
    async fn find_module(&mut self, id: ModuleId) -> StoreResult<Option<Module>>;
    async fn insert_module(&mut self, module: &Module) -> StoreResult<()>;
    async fn save_module(&mut self, module: &Module) -> StoreResult<()>;
    async fn delete_module(&mut self, id: ModuleId) -> StoreResult<bool>;
    async fn list_modules(&mut self, course_id: CourseId, page: PageRequest) -> StoreResult<Page<Module>>;
    /// Highest `order` among the course's modules (0 when it has none).
    async fn max_module_order(&mut self, course_id: CourseId) -> StoreResult<i32>;
    async fn count_modules(&mut self, course_id: CourseId) -> StoreResult<u64>;
    async fn count_all_modules(&mut self) -> StoreResult<u64>;
    /// Set one module's position. Only matches a module of `course_id`; returns
    /// whether a row was updated.
    async fn set_module_order(
        &mut self,
        course_id: CourseId,
        module_id: ModuleId,
        order: i32,
    ) -> StoreResult<bool>;
    /// `(module, order)` for every module of the course, ordered by position.
    async fn module_orders(&mut self, course_id: CourseId) -> StoreResult<Vec<(ModuleId, i32)>>;

    // enrollments
    async fn find_enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>>;
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()>;
    async fn list_enrollments(
        &mut self,
        user_id: UserId,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<Page<EnrolledCourse>>;
    async fn count_enrollments(&mut self, user_id: UserId) -> StoreResult<u64>;

    // progress
    async fn find_progress(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StoreResult<Option<ModuleProgress>>;
    /// Insert or replace the `(user, module)` progress row.
    async fn upsert_progress(&mut self, progress: &ModuleProgress) -> StoreResult<()>;
    /// Completed progress rows of `user_id` whose module belongs to `course_id`.
    async fn count_completed_modules(&mut self, user_id: UserId, course_id: CourseId) -> StoreResult<u64>;
    async fn completed_module_ids(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StoreResult<Vec<ModuleId>>;

    async fn commit(self) -> StoreResult<()>;
    async fn rollback(self) -> StoreResult<()>;
}
