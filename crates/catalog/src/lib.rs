//! Catalog domain module (courses and their ordered modules).
//!
//! This crate contains business rules for the course catalog, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod course;
pub mod module;
pub mod reorder;

pub use course::{Course, CourseUpdate, NewCourse};
pub use module::{Module, ModuleUpdate, NewModule, next_order};
pub use reorder::{ModuleOrder, ReorderPolicy};
