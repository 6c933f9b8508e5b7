//! Transactional storage boundary.
//!
//! The engine only talks to [`LearningStore`] / [`UnitOfWork`]; the in-memory
//! adapter backs tests and local runs, the Postgres adapter backs deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{FailPoint, InMemoryLearningStore, InMemoryUnitOfWork};
pub use postgres::{PostgresLearningStore, PostgresUnitOfWork, MIGRATOR};
pub use r#trait::{EnrolledCourse, LearningStore, StoreError, StoreResult, UnitOfWork};
