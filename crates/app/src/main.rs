use anyhow::Context;
use tracing::{info, warn};

use lectern_app::{AppServices, PrincipalContext};
use lectern_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lectern_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let services = AppServices::build(&config)
        .await
        .context("failed to initialise storage")?;

    let (admin, created) = services
        .ensure_admin(&config.admin_username, &config.admin_email)
        .await
        .context("failed to seed the admin account")?;
    if !admin.is_admin {
        warn!(username = %admin.username, "configured admin username belongs to a non-admin account");
        return Ok(());
    }
    if created {
        info!(user_id = %admin.id, username = %admin.username, "admin account created");
    } else {
        info!(username = %admin.username, "admin account already present");
    }

    let operator = PrincipalContext::from(&admin);
    let overview = services
        .admin_overview(&operator.principal())
        .await
        .context("failed to read catalog totals")?;

    info!(
        backend = services.backend(),
        reorder_policy = ?config.reorder_policy,
        users = overview.total_users,
        courses = overview.total_courses,
        modules = overview.total_modules,
        "lectern engine ready"
    );
    Ok(())
}
