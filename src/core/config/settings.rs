use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_percent, parse_u64,
};
use super::types::{
    AdminSettings, ApiSettings, ConfigError, CorsSettings, DeskClientSettings, IntegritySettings,
    RuntimeSettings, ServerHost, ServerPort, ServerSettings, SessionSettings, Settings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMDESK_HOST", "0.0.0.0");
        let port = env_or_default("EXAMDESK_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMDESK_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config =
            env_optional("EXAMDESK_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Desk API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let admin_password = env_or_default("ADMIN_PASSWORD", "");

        let grace_seconds =
            parse_u64("INTEGRITY_GRACE_SECONDS", env_or_default("INTEGRITY_GRACE_SECONDS", "5"))?;
        let resize_debounce_ms = parse_u64(
            "INTEGRITY_RESIZE_DEBOUNCE_MS",
            env_or_default("INTEGRITY_RESIZE_DEBOUNCE_MS", "500"),
        )?;
        let resize_threshold_percent = parse_percent(
            "INTEGRITY_RESIZE_THRESHOLD_PERCENT",
            env_or_default("INTEGRITY_RESIZE_THRESHOLD_PERCENT", "70"),
        )?;
        let baseline_settle_ms = parse_u64(
            "INTEGRITY_BASELINE_SETTLE_MS",
            env_or_default("INTEGRITY_BASELINE_SETTLE_MS", "500"),
        )?;

        let channel_name = env_or_default("SESSION_CHANNEL_NAME", "exam-session-channel");

        let desk_url = env_or_default("DESK_URL", "http://localhost:8000");
        let poll_interval_seconds = parse_u64(
            "DESK_POLL_INTERVAL_SECONDS",
            env_or_default("DESK_POLL_INTERVAL_SECONDS", "5"),
        )?;
        let request_timeout_seconds = parse_u64(
            "DESK_REQUEST_TIMEOUT_SECONDS",
            env_or_default("DESK_REQUEST_TIMEOUT_SECONDS", "10"),
        )?;

        let log_level = env_or_default("EXAMDESK_LOG_LEVEL", "info");
        let json =
            env_optional("EXAMDESK_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            admin: AdminSettings { admin_password },
            integrity: IntegritySettings {
                grace_seconds,
                resize_debounce_ms,
                resize_threshold_percent,
                baseline_settle_ms,
            },
            session: SessionSettings { channel_name },
            desk: DeskClientSettings {
                base_url: desk_url.trim_end_matches('/').to_string(),
                poll_interval_seconds,
                request_timeout_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn integrity(&self) -> &IntegritySettings {
        &self.integrity
    }

    pub(crate) fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub(crate) fn desk(&self) -> &DeskClientSettings {
        &self.desk
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.integrity.grace_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "INTEGRITY_GRACE_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.session.channel_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "SESSION_CHANNEL_NAME",
                value: String::from("<empty>"),
            });
        }

        if self.desk.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DESK_POLL_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !self.desk.base_url.starts_with("http://") && !self.desk.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "DESK_URL",
                value: self.desk.base_url.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.admin.admin_password.is_empty() {
            return Err(ConfigError::MissingSecret("ADMIN_PASSWORD"));
        }

        Ok(())
    }
}
