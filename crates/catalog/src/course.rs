use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lectern_core::{CourseId, DomainError, DomainResult, Entity, Money};

/// Input for creating a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub topics: Vec<String>,
    pub price: Decimal,
    pub thumbnail_image: Option<String>,
}

/// Replacement fields for an existing course.
///
/// `thumbnail_image: None` keeps the current thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseUpdate {
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub topics: Vec<String>,
    pub price: Decimal,
    pub thumbnail_image: Option<String>,
}

/// A purchasable course. Its modules are stored separately and reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub topics: Vec<String>,
    pub price: Money,
    pub thumbnail_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn create(new: NewCourse, now: DateTime<Utc>) -> DomainResult<Self> {
        let title = validate_title(&new.title)?;
        let price = Money::new(new.price)?;
        Ok(Self {
            id: CourseId::new(),
            title,
            description: new.description,
            instructor: new.instructor,
            topics: new.topics,
            price,
            thumbnail_image: new.thumbnail_image,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, update: CourseUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let title = validate_title(&update.title)?;
        let price = Money::new(update.price)?;
        self.title = title;
        self.description = update.description;
        self.instructor = update.instructor;
        self.topics = update.topics;
        self.price = price;
        if update.thumbnail_image.is_some() {
            self.thumbnail_image = update.thumbnail_image;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Catalog search: case-insensitive over title and topics.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle) || self.topic_matches(&needle)
    }

    /// "My courses" search additionally looks at the instructor.
    pub fn matches_enrolled_search(&self, needle: &str) -> bool {
        let lowered = needle.to_lowercase();
        self.matches_search(needle) || self.instructor.to_lowercase().contains(&lowered)
    }

    fn topic_matches(&self, lowered: &str) -> bool {
        self.topics
            .iter()
            .any(|topic| topic.to_lowercase().contains(lowered))
    }
}

impl Entity for Course {
    type Id = CourseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_title(title: &str) -> DomainResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    Ok(trimmed.to_string())
}
