use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lectern_core::{CourseId, DomainError, DomainResult, Entity, ModuleId};

/// Input for appending a module to a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewModule {
    pub title: String,
    pub description: String,
    pub pdf_content: Option<String>,
    pub video_content: Option<String>,
}

/// Replacement fields for a module. Content references are only replaced when given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleUpdate {
    pub title: String,
    pub description: String,
    pub pdf_content: Option<String>,
    pub video_content: Option<String>,
}

/// A unit of a course's curriculum.
///
/// # Invariants
/// - Belongs to exactly one course for its whole life.
/// - `order` is the module's position within that course (1-based on creation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub course_id: CourseId,
    pub title: String,
    pub description: String,
    pub order: i32,
    pub pdf_content: Option<String>,
    pub video_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order assigned to a newly created module given the course's current maximum
/// (0 when the course has no modules).
pub fn next_order(current_max: i32) -> i32 {
    current_max.max(0).saturating_add(1)
}

impl Module {
    pub fn create(
        course_id: CourseId,
        new: NewModule,
        current_max_order: i32,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("module title must not be empty"));
        }
        Ok(Self {
            id: ModuleId::new(),
            course_id,
            title: title.to_string(),
            description: new.description,
            order: next_order(current_max_order),
            pdf_content: new.pdf_content,
            video_content: new.video_content,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, update: ModuleUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let title = update.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("module title must not be empty"));
        }
        self.title = title.to_string();
        self.description = update.description;
        if update.pdf_content.is_some() {
            self.pdf_content = update.pdf_content;
        }
        if update.video_content.is_some() {
            self.video_content = update.video_content;
        }
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Module {
    type Id = ModuleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
