//! Postgres-backed learning store.
//!
//! Every unit of work wraps one `sqlx` transaction. Referential cleanup on
//! delete is done by `ON DELETE CASCADE` foreign keys (see `migrations/`), and
//! the `(user_id, course_id)` / `(user_id, module_id)` unique constraints back
//! the one-purchase and one-progress-row rules.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | Any other | `Query` |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Connection` |
//! | ColumnDecode / Decode / TypeNotFound | N/A | `Decode` |
//! | Other | N/A | `Query` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{instrument, Span};
use uuid::Uuid;

use lectern_accounts::User;
use lectern_catalog::{Course, Module};
use lectern_core::{CourseId, EnrollmentId, ModuleId, Money, Page, PageRequest, ProgressId, UserId};
use lectern_learning::{Enrollment, ModuleProgress};

use super::r#trait::{EnrolledCourse, LearningStore, StoreError, StoreResult, UnitOfWork};

/// Schema migrations shipped with the crate.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Postgres-backed learning store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLearningStore {
    pool: PgPool,
}

impl PostgresLearningStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LearningStore for PostgresLearningStore {
    type Tx = PostgresUnitOfWork;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresUnitOfWork { tx })
    }
}

/// Unit of work over one Postgres transaction. Dropping it rolls back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, balance, is_admin, created_at, updated_at";
const COURSE_COLUMNS: &str =
    "id, title, description, instructor, topics, price, thumbnail_image, created_at, updated_at";
const MODULE_COLUMNS: &str = r#"id, course_id, title, description, "order", pdf_content, video_content, created_at, updated_at"#;

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("find_user", e))?;
        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_user", e))?;
        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self), err)]
    async fn identity_taken(
        &mut self,
        username: &str,
        email: &str,
        except: Option<UserId>,
    ) -> StoreResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE (username = $1 OR email = $2)
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(except.map(|id| *id.as_uuid()))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("identity_taken", e))?;
        Ok(taken)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, balance, is_admin, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.balance.amount())
        .bind(user.is_admin)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn save_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = $2, email = $3, first_name = $4, last_name = $5,
                balance = $6, is_admin = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.balance.amount())
        .bind(user.is_admin)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_user", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_user(&mut self, id: UserId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(result_count = tracing::field::Empty), err)]
    async fn list_users(&mut self, search: Option<&str>, page: PageRequest) -> StoreResult<Page<User>> {
        let pattern = search.map(like_pattern);
        let filter = r#"
            $1::text IS NULL
            OR LOWER(username) LIKE $1 OR LOWER(first_name) LIKE $1
            OR LOWER(last_name) LIKE $1 OR LOWER(email) LIKE $1
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {filter}"))
            .bind(pattern.as_deref())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_users_filtered", e))?;

        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter} ORDER BY created_at, id LIMIT $2 OFFSET $3"
        ))
        .bind(pattern.as_deref())
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;

        Span::current().record("result_count", rows.len());
        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(users, page, to_count(total)))
    }

    #[instrument(skip(self), err)]
    async fn count_users(&mut self) -> StoreResult<u64> {
        count(&mut self.tx, "SELECT COUNT(*) FROM users", "count_users").await
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn find_course(&mut self, id: CourseId) -> StoreResult<Option<Course>> {
        let row: Option<CourseRow> =
            sqlx::query_as(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("find_course", e))?;
        row.map(Course::try_from).transpose()
    }

    #[instrument(skip(self, course), fields(course_id = %course.id), err)]
    async fn insert_course(&mut self, course: &Course) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, title, description, instructor, topics, price, thumbnail_image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(&course.title)
        .bind(&course.description)
        .bind(&course.instructor)
        .bind(&course.topics)
        .bind(course.price.amount())
        .bind(&course.thumbnail_image)
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_course", e))?;
        Ok(())
    }

    #[instrument(skip(self, course), fields(course_id = %course.id), err)]
    async fn save_course(&mut self, course: &Course) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE courses
            SET title = $2, description = $3, instructor = $4, topics = $5,
                price = $6, thumbnail_image = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(&course.title)
        .bind(&course.description)
        .bind(&course.instructor)
        .bind(&course.topics)
        .bind(course.price.amount())
        .bind(&course.thumbnail_image)
        .bind(course.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_course", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn delete_course(&mut self, id: CourseId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_course", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(result_count = tracing::field::Empty), err)]
    async fn list_courses(&mut self, search: Option<&str>, page: PageRequest) -> StoreResult<Page<Course>> {
        let pattern = search.map(like_pattern);
        let filter = r#"
            $1::text IS NULL
            OR LOWER(title) LIKE $1
            OR EXISTS (SELECT 1 FROM unnest(topics) AS topic WHERE LOWER(topic) LIKE $1)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM courses WHERE {filter}"))
            .bind(pattern.as_deref())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_courses_filtered", e))?;

        let rows: Vec<CourseRow> = sqlx::query_as(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE {filter} ORDER BY created_at, id LIMIT $2 OFFSET $3"
        ))
        .bind(pattern.as_deref())
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_courses", e))?;

        Span::current().record("result_count", rows.len());
        let courses = rows
            .into_iter()
            .map(Course::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(courses, page, to_count(total)))
    }

    #[instrument(skip(self), err)]
    async fn count_courses(&mut self) -> StoreResult<u64> {
        count(&mut self.tx, "SELECT COUNT(*) FROM courses", "count_courses").await
    }

    #[instrument(skip(self), fields(module_id = %id), err)]
    async fn find_module(&mut self, id: ModuleId) -> StoreResult<Option<Module>> {
        let row: Option<ModuleRow> =
            sqlx::query_as(&format!("SELECT {MODULE_COLUMNS} FROM modules WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("find_module", e))?;
        Ok(row.map(Module::from))
    }

    #[instrument(skip(self, module), fields(module_id = %module.id, course_id = %module.course_id), err)]
    async fn insert_module(&mut self, module: &Module) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO modules (id, course_id, title, description, "order", pdf_content, video_content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(module.id.as_uuid())
        .bind(module.course_id.as_uuid())
        .bind(&module.title)
        .bind(&module.description)
        .bind(module.order)
        .bind(&module.pdf_content)
        .bind(&module.video_content)
        .bind(module.created_at)
        .bind(module.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_module", e))?;
        Ok(())
    }

    #[instrument(skip(self, module), fields(module_id = %module.id), err)]
    async fn save_module(&mut self, module: &Module) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE modules
            SET title = $2, description = $3, "order" = $4, pdf_content = $5,
                video_content = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(module.id.as_uuid())
        .bind(&module.title)
        .bind(&module.description)
        .bind(module.order)
        .bind(&module.pdf_content)
        .bind(&module.video_content)
        .bind(module.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_module", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(module_id = %id), err)]
    async fn delete_module(&mut self, id: ModuleId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM modules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_module", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(course_id = %course_id, result_count = tracing::field::Empty), err)]
    async fn list_modules(&mut self, course_id: CourseId, page: PageRequest) -> StoreResult<Page<Module>> {
        let total = self.count_modules(course_id).await?;

        let rows: Vec<ModuleRow> = sqlx::query_as(&format!(
            r#"SELECT {MODULE_COLUMNS} FROM modules WHERE course_id = $1 ORDER BY "order", created_at, id LIMIT $2 OFFSET $3"#
        ))
        .bind(course_id.as_uuid())
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_modules", e))?;

        Span::current().record("result_count", rows.len());
        let modules = rows.into_iter().map(Module::from).collect();
        Ok(Page::new(modules, page, total))
    }

    #[instrument(skip(self), fields(course_id = %course_id), err)]
    async fn max_module_order(&mut self, course_id: CourseId) -> StoreResult<i32> {
        let max: i32 = sqlx::query_scalar(
            r#"SELECT COALESCE(MAX("order"), 0) FROM modules WHERE course_id = $1"#,
        )
        .bind(course_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("max_module_order", e))?;
        Ok(max)
    }

    #[instrument(skip(self), fields(course_id = %course_id), err)]
    async fn count_modules(&mut self, course_id: CourseId) -> StoreResult<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM modules WHERE course_id = $1")
            .bind(course_id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_modules", e))?;
        Ok(to_count(total))
    }

    #[instrument(skip(self), err)]
    async fn count_all_modules(&mut self) -> StoreResult<u64> {
        count(&mut self.tx, "SELECT COUNT(*) FROM modules", "count_all_modules").await
    }

    #[instrument(skip(self), fields(course_id = %course_id, module_id = %module_id), err)]
    async fn set_module_order(
        &mut self,
        course_id: CourseId,
        module_id: ModuleId,
        order: i32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"UPDATE modules SET "order" = $1, updated_at = NOW() WHERE id = $2 AND course_id = $3"#,
        )
        .bind(order)
        .bind(module_id.as_uuid())
        .bind(course_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_module_order", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(course_id = %course_id), err)]
    async fn module_orders(&mut self, course_id: CourseId) -> StoreResult<Vec<(ModuleId, i32)>> {
        let rows: Vec<(Uuid, i32)> = sqlx::query_as(
            r#"SELECT id, "order" FROM modules WHERE course_id = $1 ORDER BY "order", id"#,
        )
        .bind(course_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("module_orders", e))?;
        Ok(rows
            .into_iter()
            .map(|(id, order)| (ModuleId::from_uuid(id), order))
            .collect())
    }

    #[instrument(skip(self), fields(user_id = %user_id, course_id = %course_id), err)]
    async fn find_enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        let row: Option<EnrollmentRow> = sqlx::query_as(
            "SELECT id, user_id, course_id, purchased_at FROM enrollments WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(course_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_enrollment", e))?;
        Ok(row.map(Enrollment::from))
    }

    #[instrument(skip(self, enrollment), fields(user_id = %enrollment.user_id, course_id = %enrollment.course_id), err)]
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO enrollments (id, user_id, course_id, purchased_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.user_id.as_uuid())
        .bind(enrollment.course_id.as_uuid())
        .bind(enrollment.purchased_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_enrollment", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id, result_count = tracing::field::Empty), err)]
    async fn list_enrollments(
        &mut self,
        user_id: UserId,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<Page<EnrolledCourse>> {
        let pattern = search.map(like_pattern);
        let filter = r#"
            e.user_id = $1 AND (
                $2::text IS NULL
                OR LOWER(c.title) LIKE $2
                OR LOWER(c.instructor) LIKE $2
                OR EXISTS (SELECT 1 FROM unnest(c.topics) AS topic WHERE LOWER(topic) LIKE $2)
            )
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM enrollments e JOIN courses c ON c.id = e.course_id WHERE {filter}"
        ))
        .bind(user_id.as_uuid())
        .bind(pattern.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_enrollments_filtered", e))?;

        let rows: Vec<EnrolledCourseRow> = sqlx::query_as(&format!(
            r#"
            SELECT
                e.id AS enrollment_id,
                e.user_id,
                e.purchased_at,
                c.id,
                c.title,
                c.description,
                c.instructor,
                c.topics,
                c.price,
                c.thumbnail_image,
                c.created_at,
                c.updated_at
            FROM enrollments e
            JOIN courses c ON c.id = e.course_id
            WHERE {filter}
            ORDER BY e.purchased_at DESC, e.id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(pattern.as_deref())
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_enrollments", e))?;

        Span::current().record("result_count", rows.len());
        let items = rows
            .into_iter()
            .map(EnrolledCourse::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(items, page, to_count(total)))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn count_enrollments(&mut self, user_id: UserId) -> StoreResult<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_enrollments", e))?;
        Ok(to_count(total))
    }

    #[instrument(skip(self), fields(user_id = %user_id, module_id = %module_id), err)]
    async fn find_progress(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StoreResult<Option<ModuleProgress>> {
        let row: Option<ProgressRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, module_id, is_completed, completed_at
            FROM module_progress
            WHERE user_id = $1 AND module_id = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(module_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_progress", e))?;
        Ok(row.map(ModuleProgress::from))
    }

    #[instrument(skip(self, progress), fields(user_id = %progress.user_id, module_id = %progress.module_id), err)]
    async fn upsert_progress(&mut self, progress: &ModuleProgress) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO module_progress (id, user_id, module_id, is_completed, completed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, module_id)
            DO UPDATE SET is_completed = EXCLUDED.is_completed, completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(progress.id.as_uuid())
        .bind(progress.user_id.as_uuid())
        .bind(progress.module_id.as_uuid())
        .bind(progress.is_completed)
        .bind(progress.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_progress", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id, course_id = %course_id), err)]
    async fn count_completed_modules(&mut self, user_id: UserId, course_id: CourseId) -> StoreResult<u64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM module_progress mp
            JOIN modules m ON m.id = mp.module_id
            WHERE mp.user_id = $1 AND m.course_id = $2 AND mp.is_completed
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(course_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_completed_modules", e))?;
        Ok(to_count(total))
    }

    #[instrument(skip(self), fields(user_id = %user_id, course_id = %course_id), err)]
    async fn completed_module_ids(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StoreResult<Vec<ModuleId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT mp.module_id
            FROM module_progress mp
            JOIN modules m ON m.id = mp.module_id
            WHERE mp.user_id = $1 AND m.course_id = $2 AND mp.is_completed
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(course_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("completed_module_ids", e))?;
        Ok(ids.into_iter().map(ModuleId::from_uuid).collect())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("commit failed: {e}")))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::Transaction(format!("rollback failed: {e}")))
    }
}

async fn count(
    tx: &mut Transaction<'static, Postgres>,
    sql: &'static str,
    operation: &str,
) -> StoreResult<u64> {
    let total: i64 = sqlx::query_scalar(sql)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    Ok(to_count(total))
}

fn to_count(total: i64) -> u64 {
    u64::try_from(total).unwrap_or(0)
}

fn offset(page: PageRequest) -> i64 {
    i64::try_from(page.offset()).unwrap_or(i64::MAX)
}

/// `%needle%`, lowercased, with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Duplicate(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        _ => StoreError::Query(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    balance: Decimal,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let balance = Money::new(row.balance)
            .map_err(|e| StoreError::Decode(format!("user {} balance: {e}", row.id)))?;
        Ok(User {
            id: UserId::from_uuid(row.id),
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            balance,
            is_admin: row.is_admin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CourseRow {
    id: Uuid,
    title: String,
    description: String,
    instructor: String,
    topics: Vec<String>,
    price: Decimal,
    thumbnail_image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourseRow> for Course {
    type Error = StoreError;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        let price = Money::new(row.price)
            .map_err(|e| StoreError::Decode(format!("course {} price: {e}", row.id)))?;
        Ok(Course {
            id: CourseId::from_uuid(row.id),
            title: row.title,
            description: row.description,
            instructor: row.instructor,
            topics: row.topics,
            price,
            thumbnail_image: row.thumbnail_image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ModuleRow {
    id: Uuid,
    course_id: Uuid,
    title: String,
    description: String,
    order: i32,
    pdf_content: Option<String>,
    video_content: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ModuleRow> for Module {
    fn from(row: ModuleRow) -> Self {
        Module {
            id: ModuleId::from_uuid(row.id),
            course_id: CourseId::from_uuid(row.course_id),
            title: row.title,
            description: row.description,
            order: row.order,
            pdf_content: row.pdf_content,
            video_content: row.video_content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct EnrollmentRow {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    purchased_at: DateTime<Utc>,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            id: EnrollmentId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            course_id: CourseId::from_uuid(row.course_id),
            purchased_at: row.purchased_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct EnrolledCourseRow {
    enrollment_id: Uuid,
    user_id: Uuid,
    purchased_at: DateTime<Utc>,
    #[sqlx(flatten)]
    course: CourseRow,
}

impl TryFrom<EnrolledCourseRow> for EnrolledCourse {
    type Error = StoreError;

    fn try_from(row: EnrolledCourseRow) -> Result<Self, Self::Error> {
        let course = Course::try_from(row.course)?;
        Ok(EnrolledCourse {
            enrollment: Enrollment {
                id: EnrollmentId::from_uuid(row.enrollment_id),
                user_id: UserId::from_uuid(row.user_id),
                course_id: course.id,
                purchased_at: row.purchased_at,
            },
            course,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProgressRow {
    id: Uuid,
    user_id: Uuid,
    module_id: Uuid,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ProgressRow> for ModuleProgress {
    fn from(row: ProgressRow) -> Self {
        ModuleProgress {
            id: ProgressId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            module_id: ModuleId::from_uuid(row.module_id),
            is_completed: row.is_completed,
            completed_at: row.completed_at,
        }
    }
}
