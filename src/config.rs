use std::env;

/// Runtime configuration. All values read from environment variables with
/// sensible defaults; unknown variables are ignored.
///
/// Environment variables:
/// - `HOST` — Bind address (default: 0.0.0.0)
/// - `PORT` — Listen port (default: 8000)
/// - `LOG_LEVEL` — DEBUG | INFO | WARN | ERROR (default: INFO)
/// - `DATABASE_URL` — SQLite path, optionally `sqlite://` prefixed (default: data/queryops.db)
/// - `DATABASE_MIN_CONNS` / `DATABASE_MAX_CONNS` — pool bounds (retained; SQLite
///   runs a single serialized connection)
/// - `SESSION_SECRET` — cookie signing secret (session layer is external)
/// - `AUTO_MIGRATE` — run schema migrations at startup (default: true)
/// - `BACKGROUND_PROCESSING` — enable the background job runner (external)
/// - `PUBSUB_ENABLED` — enable the event bus (default: true)
/// - `NATS_URL` — external broker URL; empty starts the embedded broker
/// - `WEBAUTHN_RP_ID` / `WEBAUTHN_RP_ORIGIN` / `WEBAUTHN_RP_DISPLAY_NAME` —
///   passkey relying-party settings (passkey flows are external)
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: String,
    pub database_min_conns: u32,
    pub database_max_conns: u32,
    pub session_secret: Option<String>,
    pub auto_migrate: bool,
    pub background_processing: bool,
    pub pubsub_enabled: bool,
    pub nats_url: String,
    pub webauthn_rp_id: Option<String>,
    pub webauthn_rp_origin: Option<String>,
    pub webauthn_rp_display_name: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "INFO".to_string(),
            database_url: "data/queryops.db".to_string(),
            database_min_conns: 1,
            database_max_conns: 5,
            session_secret: None,
            auto_migrate: true,
            background_processing: true,
            pubsub_enabled: true,
            nats_url: String::new(),
            webauthn_rp_id: None,
            webauthn_rp_origin: None,
            webauthn_rp_display_name: None,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

impl AppConfig {
    /// Create a new AppConfig from environment variables, with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("HOST")
            && !val.trim().is_empty()
        {
            config.host = val;
        }
        if let Ok(val) = env::var("PORT")
            && let Ok(n) = val.parse::<u16>()
        {
            config.port = n;
        }
        if let Ok(val) = env::var("LOG_LEVEL")
            && !val.trim().is_empty()
        {
            config.log_level = val.trim().to_uppercase();
        }
        if let Ok(val) = env::var("DATABASE_URL")
            && !val.trim().is_empty()
        {
            config.database_url = val;
        }
        if let Ok(val) = env::var("DATABASE_MIN_CONNS")
            && let Ok(n) = val.parse::<u32>()
        {
            config.database_min_conns = n;
        }
        if let Ok(val) = env::var("DATABASE_MAX_CONNS")
            && let Ok(n) = val.parse::<u32>()
        {
            config.database_max_conns = n;
        }
        if let Ok(val) = env::var("SESSION_SECRET")
            && !val.is_empty()
        {
            config.session_secret = Some(val);
        }
        config.auto_migrate = env_bool("AUTO_MIGRATE", config.auto_migrate);
        config.background_processing =
            env_bool("BACKGROUND_PROCESSING", config.background_processing);
        config.pubsub_enabled = env_bool("PUBSUB_ENABLED", config.pubsub_enabled);
        if let Ok(val) = env::var("NATS_URL") {
            config.nats_url = val.trim().to_string();
        }
        if let Ok(val) = env::var("WEBAUTHN_RP_ID") {
            config.webauthn_rp_id = Some(val);
        }
        if let Ok(val) = env::var("WEBAUTHN_RP_ORIGIN") {
            config.webauthn_rp_origin = Some(val);
        }
        if let Ok(val) = env::var("WEBAUTHN_RP_DISPLAY_NAME") {
            config.webauthn_rp_display_name = Some(val);
        }

        config
    }

    /// Filesystem path behind `DATABASE_URL` (strips an optional sqlite scheme).
    pub fn database_path(&self) -> &str {
        let url = self.database_url.as_str();
        url.strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
    }

    /// Map `LOG_LEVEL` onto Rocket's `log_level` figment value.
    pub fn rocket_log_level(&self) -> &'static str {
        match self.log_level.as_str() {
            "DEBUG" => "debug",
            "WARN" | "ERROR" => "critical",
            _ => "normal",
        }
    }
}
