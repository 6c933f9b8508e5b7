//! Results returned by engine operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lectern_accounts::User;
use lectern_catalog::{Course, Module, ModuleOrder};
use lectern_core::{CourseId, EnrollmentId, ModuleId, Money, UserId};
use lectern_learning::{CourseProgress, Enrollment};

/// Outcome of a successful purchase. `transaction_id` is the new enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub course_id: CourseId,
    pub user_balance: Money,
    pub transaction_id: EnrollmentId,
}

/// Outcome of completing a module.
///
/// `certificate_url` is `None` unless this completion brought the course to 100%
/// and issuance succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub module_id: ModuleId,
    pub is_completed: bool,
    pub course_progress: CourseProgress,
    pub certificate_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderResult {
    pub course_id: CourseId,
    pub module_order: Vec<ModuleOrder>,
    /// Pairs that matched a module of the course.
    pub updated_modules: u32,
}

/// A course as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseView {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub topics: Vec<String>,
    pub price: Money,
    pub thumbnail_image: Option<String>,
    pub total_modules: u64,
    pub completed_modules: u64,
    pub progress_percentage: f64,
    pub is_purchased: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseView {
    pub fn new(course: Course, progress: CourseProgress, is_purchased: bool) -> Self {
        Self {
            id: course.id,
            title: course.title,
            description: course.description,
            instructor: course.instructor,
            topics: course.topics,
            price: course.price,
            thumbnail_image: course.thumbnail_image,
            total_modules: progress.total_modules,
            completed_modules: progress.completed_modules,
            progress_percentage: progress.percentage,
            is_purchased,
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

/// A purchased course with the buyer's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledCourseView {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub topics: Vec<String>,
    pub price: Money,
    pub thumbnail_image: Option<String>,
    pub total_modules: u64,
    pub completed_modules: u64,
    pub progress_percentage: f64,
    pub is_completed: bool,
    /// Purchase date, e.g. `Jan 2, 2006`.
    pub purchased_at: String,
}

impl EnrolledCourseView {
    pub fn new(enrollment: &Enrollment, course: Course, progress: CourseProgress) -> Self {
        Self {
            id: course.id,
            title: course.title,
            description: course.description,
            instructor: course.instructor,
            topics: course.topics,
            price: course.price,
            thumbnail_image: course.thumbnail_image,
            total_modules: progress.total_modules,
            completed_modules: progress.completed_modules,
            progress_percentage: progress.percentage,
            is_completed: progress.is_complete(),
            purchased_at: enrollment.purchased_on(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleView {
    pub id: ModuleId,
    pub course_id: CourseId,
    pub title: String,
    pub description: String,
    pub order: i32,
    pub pdf_content: Option<String>,
    pub video_content: Option<String>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModuleView {
    pub fn new(module: Module, is_completed: bool) -> Self {
        Self {
            id: module.id,
            course_id: module.course_id,
            title: module.title,
            description: module.description,
            order: module.order,
            pdf_content: module.pdf_content,
            video_content: module.video_content,
            is_completed,
            created_at: module.created_at,
            updated_at: module.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub balance: Money,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            balance: user.balance,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetailView {
    #[serde(flatten)]
    pub user: UserView,
    pub courses_purchased: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub user: UserView,
    pub balance: Money,
    pub enrolled_courses: Vec<EnrolledCourseView>,
    pub total_enrolled: u64,
    pub completed_courses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOverview {
    pub total_users: u64,
    pub total_courses: u64,
    pub total_modules: u64,
}
