use crate::core::state::AppState;
use crate::repositories;

/// Seeds the admin password from `ADMIN_PASSWORD` when the store has none.
/// A password already in the store wins; it may have been changed through the API.
pub(crate) async fn ensure_app_config(state: &AppState) -> anyhow::Result<()> {
    if let Some(config) = repositories::app_config::find(state.store()).await? {
        if !config.admin_password.is_empty() {
            tracing::info!("Application config already present");
            return Ok(());
        }
    }

    let password = &state.settings().admin().admin_password;
    if password.is_empty() {
        tracing::warn!("ADMIN_PASSWORD not configured; admin login stays disabled");
        return Ok(());
    }

    repositories::app_config::set_admin_password(state.store(), password).await?;
    tracing::info!("Seeded admin password from configuration");
    Ok(())
}
