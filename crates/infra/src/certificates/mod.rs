//! Certificate issuance after a course is completed.
//!
//! The engine hands a [`CourseCompleted`] to an issuer only after the completing
//! transaction has committed. Issuance failures never undo progress.

pub mod file;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use lectern_learning::{CertificateRef, CourseCompleted};

pub use file::FileCertificateIssuer;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to write certificate: {0}")]
    Io(#[from] std::io::Error),

    #[error("certificate rejected: {0}")]
    Rejected(String),
}

/// Produces a certificate artifact and returns a reference to it.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(&self, completion: &CourseCompleted) -> Result<CertificateRef, CertificateError>;
}

#[async_trait]
impl<I> CertificateIssuer for Arc<I>
where
    I: CertificateIssuer + ?Sized,
{
    async fn issue(&self, completion: &CourseCompleted) -> Result<CertificateRef, CertificateError> {
        (**self).issue(completion).await
    }
}
