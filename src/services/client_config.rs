use crate::core::config::Settings;
use crate::services::remote_desk::RemoteDeskConfig;
use crate::session::IntegrityConfig;

/// What a student-facing shell needs to run sessions against a desk server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub desk: RemoteDeskConfig,
    pub integrity: IntegrityConfig,
    /// Broadcast channel name shared by every tab of the same browser profile.
    pub channel_name: String,
}

impl ClientConfig {
    /// Reads `.env` and the process environment, same keys as the server.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let settings = Settings::load()?;
        Ok(Self::from_settings(&settings))
    }

    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            desk: RemoteDeskConfig::from_settings(settings),
            integrity: IntegrityConfig::from(settings.integrity()),
            channel_name: settings.session().channel_name.clone(),
        }
    }
}
