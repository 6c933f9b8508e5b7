//! Enrollment & progress engine (application-level orchestration).
//!
//! Every operation follows the same shape:
//!
//! ```text
//! request (+ caller principal)
//!   ↓
//! 1. Authorize (admin-only operations)
//!   ↓
//! 2. Begin a unit of work
//!   ↓
//! 3. Load, decide with domain rules, write
//!   ↓
//! 4. Commit (any early return drops the unit of work, discarding its writes)
//!   ↓
//! 5. Post-commit hooks (certificate issuance)
//! ```
//!
//! The engine contains no IO itself; it composes [`LearningStore`] and
//! [`CertificateIssuer`].

mod access;
mod catalog;
mod completion;
mod dashboard;
mod progress;
mod purchase;
mod reorder;
mod users;
pub mod views;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use lectern_auth::AuthzError;
use lectern_catalog::ReorderPolicy;
use lectern_core::{DomainError, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use lectern_learning::{CertificateRef, CourseCompleted};

use crate::certificates::CertificateIssuer;
use crate::store::{LearningStore, StoreError};

pub use access::has_access;
pub use progress::course_progress;

/// Outcome category of a failed operation, for mapping onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InsufficientFunds,
    Forbidden,
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage failure; the operation's writes were not committed.
    #[error("internal error: {0}")]
    Internal(StoreError),
}

impl EngineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::NotFound(msg) => EngineError::NotFound(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
            DomainError::InsufficientFunds(msg) => EngineError::InsufficientFunds(msg),
            DomainError::Forbidden(msg) => EngineError::Forbidden(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        EngineError::Internal(value)
    }
}

impl From<AuthzError> for EngineError {
    fn from(value: AuthzError) -> Self {
        EngineError::Forbidden(value.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Tunables that change engine behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub reorder_policy: ReorderPolicy,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Username that can never be deleted.
    pub protected_username: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reorder_policy: ReorderPolicy::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            protected_username: "admin".to_string(),
        }
    }
}

impl EngineSettings {
    /// Re-apply this engine's page bounds to a caller-supplied request.
    pub fn page(&self, request: PageRequest) -> PageRequest {
        PageRequest::bounded(
            Some(request.page),
            Some(request.limit),
            self.default_page_size,
            self.max_page_size,
        )
    }
}

/// Trimmed, non-empty search text.
fn search_term(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|s| !s.is_empty())
}

/// Enrollment, progress and catalog operations over a transactional store.
///
/// ## Generic Parameters
///
/// - `S`: storage ([`LearningStore`])
/// - `C`: certificate issuer ([`CertificateIssuer`])
#[derive(Debug)]
pub struct EnrollmentEngine<S, C> {
    store: S,
    certificates: C,
    settings: EngineSettings,
}

impl<S, C> EnrollmentEngine<S, C> {
    pub fn new(store: S, certificates: C) -> Self {
        Self::with_settings(store, certificates, EngineSettings::default())
    }

    pub fn with_settings(store: S, certificates: C, settings: EngineSettings) -> Self {
        Self {
            store,
            certificates,
            settings,
        }
    }
}

impl<S, C> EnrollmentEngine<S, C>
where
    S: LearningStore,
    C: CertificateIssuer,
{
    /// Post-completion hook. Failures are logged and reported as "no certificate".
    async fn issue_certificate(&self, completion: &CourseCompleted) -> Option<CertificateRef> {
        match self.certificates.issue(completion).await {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(
                    user_id = %completion.user_id,
                    course_id = %completion.course_id,
                    error = %err,
                    "certificate issuance failed; progress is kept"
                );
                None
            }
        }
    }
}
