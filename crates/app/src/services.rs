use std::sync::Arc;

use tracing::info;

use lectern_auth::Principal;
use lectern_infra::engine::views::{AdminOverview, UserView};
use lectern_infra::engine::EngineResult;
use lectern_infra::store::StoreResult;
use lectern_infra::{
    EngineConfig, EnrollmentEngine, FileCertificateIssuer, InMemoryLearningStore, PostgresLearningStore,
};

pub type InMemoryEngine = EnrollmentEngine<InMemoryLearningStore, FileCertificateIssuer>;
pub type PersistentEngine = EnrollmentEngine<PostgresLearningStore, FileCertificateIssuer>;

/// The engine behind whichever store the configuration selects.
#[derive(Clone)]
pub enum AppServices {
    InMemory { engine: Arc<InMemoryEngine> },
    Persistent { engine: Arc<PersistentEngine> },
}

impl AppServices {
    /// Connect (and migrate) Postgres when `DATABASE_URL` is set, otherwise
    /// fall back to the in-memory store.
    pub async fn build(config: &EngineConfig) -> StoreResult<Self> {
        let Some(url) = config.database_url.as_deref() else {
            return Ok(Self::in_memory(config));
        };

        let store = PostgresLearningStore::connect(url, config.database_max_connections).await?;
        store.migrate().await?;
        info!("postgres store ready");

        let engine = EnrollmentEngine::with_settings(store, certificate_issuer(config), config.settings());
        Ok(Self::Persistent {
            engine: Arc::new(engine),
        })
    }

    pub fn in_memory(config: &EngineConfig) -> Self {
        let engine = EnrollmentEngine::with_settings(
            InMemoryLearningStore::new(),
            certificate_issuer(config),
            config.settings(),
        );
        Self::InMemory {
            engine: Arc::new(engine),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Persistent { .. } => "postgres",
        }
    }

    /// Seed the administrator account. Returns whether it was created.
    pub async fn ensure_admin(&self, username: &str, email: &str) -> EngineResult<(UserView, bool)> {
        match self {
            AppServices::InMemory { engine } => engine.ensure_admin(username, email).await,
            AppServices::Persistent { engine } => engine.ensure_admin(username, email).await,
        }
    }

    pub async fn admin_overview(&self, principal: &Principal) -> EngineResult<AdminOverview> {
        match self {
            AppServices::InMemory { engine } => engine.admin_overview(principal).await,
            AppServices::Persistent { engine } => engine.admin_overview(principal).await,
        }
    }
}

fn certificate_issuer(config: &EngineConfig) -> FileCertificateIssuer {
    FileCertificateIssuer::new(&config.certificate_dir, config.certificate_url_prefix.clone())
}
