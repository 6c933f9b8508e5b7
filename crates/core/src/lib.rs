//! `lectern-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod page;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CourseId, EnrollmentId, ModuleId, ProgressId, UserId};
pub use money::Money;
pub use page::{Page, PageRequest, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use value_object::ValueObject;
