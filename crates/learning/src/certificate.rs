use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lectern_core::{CourseId, UserId};

/// Emitted once a completion brings a user's course progress to 100%.
///
/// Carries everything a certificate needs so issuers never read storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCompleted {
    pub user_id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub course_id: CourseId,
    pub course_title: String,
    pub instructor: String,
    pub completed_at: DateTime<Utc>,
}

/// Reference (URL or path) to an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateRef(String);

impl CertificateRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for CertificateRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
