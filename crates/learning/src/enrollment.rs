use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lectern_core::{CourseId, EnrollmentId, Entity, UserId};

/// Record that a user purchased a course. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub purchased_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn record(user_id: UserId, course_id: CourseId, purchased_at: DateTime<Utc>) -> Self {
        Self {
            id: EnrollmentId::new(),
            user_id,
            course_id,
            purchased_at,
        }
    }

    /// Purchase date as shown in listings, e.g. "Jan 2, 2006".
    pub fn purchased_on(&self) -> String {
        self.purchased_at.format("%b %-d, %Y").to_string()
    }
}

impl Entity for Enrollment {
    type Id = EnrollmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
