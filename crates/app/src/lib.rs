//! Process wiring: picks a storage backend from configuration and builds the
//! engine on top of it.

pub mod context;
pub mod services;

pub use context::PrincipalContext;
pub use services::AppServices;
