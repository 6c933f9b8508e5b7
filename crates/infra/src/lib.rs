//! Infrastructure layer: storage adapters, certificate issuance, configuration,
//! and the enrollment engine that composes them.

pub mod certificates;
pub mod config;
pub mod engine;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use certificates::{CertificateError, CertificateIssuer, FileCertificateIssuer};
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, EngineResult, EngineSettings, EnrollmentEngine, ErrorKind};
pub use store::{InMemoryLearningStore, LearningStore, PostgresLearningStore, StoreError, UnitOfWork};
