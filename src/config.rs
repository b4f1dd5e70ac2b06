use std::path::PathBuf;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least 32 bytes long")]
    WeakSecret,
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read from the process environment (`.env` is loaded
/// beforehand in debug builds).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
    pub swagger_ui: bool,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        fn parsed<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
            match raw {
                None => Ok(default),
                Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name, value: v }),
            }
        }
        fn flag(raw: Option<String>, default: bool) -> bool {
            raw.map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
        }

        Ok(Self {
            bind: get("WISHWALL_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("WISHWALL_PORT", get("WISHWALL_PORT"), 8080)?,
            data_dir: get("WISHWALL_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            frontend_url: get("FRONTEND_URL").filter(|v| !v.is_empty()),
            enable_hsts: flag(get("ENABLE_HSTS"), false),
            swagger_ui: flag(get("SWAGGER_UI_ENABLED"), true),
            database_url: get("DATABASE_URL"),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 5)?,
        })
    }
}
