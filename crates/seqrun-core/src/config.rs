// Platform configuration
//
// Configuration is environment-derived: a `.env` file is honored when
// present, then individual variables override. Every field has a local
// default so a bare `seqrun-worker` run works against a local records
// app and broker.

use serde::{Deserialize, Serialize};

/// Records-app endpoint and service credentials
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    pub url: Option<String>,
    pub default_admin_email: Option<String>,
    pub default_admin_password: Option<String>,
}

impl ApiConfig {
    pub fn url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8090".to_string())
    }

    pub fn default_admin_email(&self) -> String {
        self.default_admin_email.clone().unwrap_or_default()
    }

    pub fn default_admin_password(&self) -> String {
        self.default_admin_password.clone().unwrap_or_default()
    }
}

/// Broker endpoint
#[derive(Debug, Clone, Default)]
pub struct MqConfig {
    pub url: Option<String>,
}

impl MqConfig {
    pub fn url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| "nats://127.0.0.1:4222".to_string())
    }
}

/// Passed through to the records app
#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    pub migrations_dir: Option<String>,
}

impl DbConfig {
    pub fn migrations_dir(&self) -> String {
        self.migrations_dir
            .clone()
            .unwrap_or_else(|| "migrations".to_string())
    }
}

/// Workflow-engine overrides
#[derive(Debug, Clone, Default)]
pub struct NxfConfig {
    pub plugins_test_repository: Option<String>,
}

impl NxfConfig {
    pub fn plugins_test_repository(&self) -> String {
        self.plugins_test_repository.clone().unwrap_or_default()
    }
}

/// Log verbosity, applied when RUST_LOG is unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "fatal" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// Directive understood by tracing's EnvFilter. `fatal` has no tracing
    /// counterpart and maps to `error`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

/// Platform configuration, one instance per process
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiConfig,
    pub mq: MqConfig,
    pub db: DbConfig,
    pub nxf: NxfConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the environment, honoring a `.env` file.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let level = std::env::var("LOGGING_LEVEL")
            .ok()
            .and_then(|s| LogLevel::parse(&s))
            .unwrap_or_default();

        Self {
            api: ApiConfig {
                url: std::env::var("API_URL").ok(),
                default_admin_email: std::env::var("API_DEFAULT_ADMIN_EMAIL").ok(),
                default_admin_password: std::env::var("API_DEFAULT_ADMIN_PASSWORD").ok(),
            },
            mq: MqConfig {
                url: std::env::var("MQ_URL").ok(),
            },
            db: DbConfig {
                migrations_dir: std::env::var("DB_MIGRATIONS_DIR").ok(),
            },
            nxf: NxfConfig {
                plugins_test_repository: std::env::var("NXF_PLUGINS_TEST_REPOSITORY").ok(),
            },
            logging: LoggingConfig { level },
        }
    }
}
