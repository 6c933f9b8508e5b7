use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lectern_core::{ModuleId, ProgressId, UserId, ValueObject};

/// Completion flag for one (user, module) pair. Created lazily on first completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub id: ProgressId,
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ModuleProgress {
    pub fn completed(user_id: UserId, module_id: ModuleId, now: DateTime<Utc>) -> Self {
        Self {
            id: ProgressId::new(),
            user_id,
            module_id,
            is_completed: true,
            completed_at: Some(now),
        }
    }

    /// Mark complete. Re-marking keeps the original completion time.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.is_completed = true;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }
}

/// A user's progress through one course.
///
/// # Invariants
/// - `completed_modules <= total_modules`
/// - `percentage == completed / total * 100`, or `0` when the course has no modules
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub total_modules: u64,
    pub completed_modules: u64,
    pub percentage: f64,
}

impl CourseProgress {
    /// Derive progress from raw counts.
    ///
    /// Completion rows that outnumber the course's modules are clamped to the
    /// module count.
    pub fn compute(total_modules: u64, completed_modules: u64) -> Self {
        let completed_modules = completed_modules.min(total_modules);
        let percentage = if total_modules == 0 {
            0.0
        } else {
            completed_modules as f64 / total_modules as f64 * 100.0
        };
        Self {
            total_modules,
            completed_modules,
            percentage,
        }
    }

    /// Progress of a user who has not purchased the course.
    pub fn not_started(total_modules: u64) -> Self {
        Self::compute(total_modules, 0)
    }

    /// Whether every module is complete. Courses without modules never are.
    pub fn is_complete(&self) -> bool {
        self.total_modules > 0 && self.percentage >= 100.0
    }

    /// Percentage rounded to the nearest whole number, for display.
    pub fn rounded_percentage(&self) -> u32 {
        self.percentage.round().clamp(0.0, 100.0) as u32
    }
}

impl ValueObject for CourseProgress {}
