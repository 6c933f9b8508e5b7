//! Learning domain module: enrollments, per-module progress, and the course
//! progress rule every read path shares.
//!
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod certificate;
pub mod enrollment;
pub mod progress;

pub use certificate::{CertificateRef, CourseCompleted};
pub use enrollment::Enrollment;
pub use progress::{CourseProgress, ModuleProgress};
