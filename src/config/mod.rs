//! Configuration types and builders.

use crate::error::{ConfigError, DatabaseError, McpError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Database vendor enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Mariadb,
    Mssql,
    Mysql,
    Oracle,
    Postgresql,
    Sqlite,
}

impl Vendor {
    pub const ALL: [Vendor; 6] = [
        Vendor::Mariadb,
        Vendor::Mssql,
        Vendor::Mysql,
        Vendor::Oracle,
        Vendor::Postgresql,
        Vendor::Sqlite,
    ];

    /// Parse a vendor from a string.
    ///
    /// Accepts various common aliases for each vendor.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mariadb" => Some(Self::Mariadb),
            "mssql" | "sqlserver" | "sql_server" => Some(Self::Mssql),
            "mysql" => Some(Self::Mysql),
            "oracle" => Some(Self::Oracle),
            "postgresql" | "postgres" | "pg" => Some(Self::Postgresql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mariadb => "mariadb",
            Self::Mssql => "mssql",
            Self::Mysql => "mysql",
            Self::Oracle => "oracle",
            Self::Postgresql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Mariadb | Self::Mysql => 3306,
            Self::Mssql => 1433,
            Self::Oracle => 1521,
            Self::Postgresql => 5432,
            Self::Sqlite => 0,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Vendor {
    type Error = DatabaseError;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(s).ok_or_else(|| DatabaseError::UnsupportedVendor(s.to_string()))
    }
}

impl TryFrom<String> for Vendor {
    type Error = DatabaseError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}

/// Credential file locations, one per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub db_path: PathBuf,
    pub servicenow_path: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("db_credentials.jsonl"),
            servicenow_path: PathBuf::from("sn_credentials.jsonl"),
        }
    }
}

/// Managed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Ticketing client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    pub result_limit: u32,
    pub request_timeout: Duration,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            result_limit: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily-rotated JSON log files go here when set.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            dir: None,
        }
    }
}

/// Proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub name: Cow<'static, str>,
    pub version: Cow<'static, str>,
    pub queries_dir: PathBuf,
    pub credentials: CredentialsConfig,
    pub connection: ConnectionSettings,
    pub ticketing: TicketingConfig,
    pub logging: LoggingConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            name: "dbproxy-mcp".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            queries_dir: PathBuf::from("queries"),
            credentials: CredentialsConfig::default(),
            connection: ConnectionSettings::default(),
            ticketing: TicketingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }
}

/// Builder for ProxyConfig with fluent API.
#[derive(Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn queries_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.queries_dir = dir.into();
        self
    }

    pub fn db_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials.db_path = path.into();
        self
    }

    pub fn servicenow_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials.servicenow_path = path.into();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection.idle_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection.connect_timeout = timeout;
        self
    }

    pub fn ticketing_result_limit(mut self, limit: u32) -> Self {
        self.config.ticketing.result_limit = limit;
        self
    }

    pub fn ticketing_timeout(mut self, timeout: Duration) -> Self {
        self.config.ticketing.request_timeout = timeout;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.logging.dir = Some(dir.into());
        self
    }

    /// Build from environment variables.
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(path) = env::var("PROXY_DB_CREDENTIALS_PATH") {
            self.config.credentials.db_path = path.into();
        }

        if let Ok(path) = env::var("PROXY_SN_CREDENTIALS_PATH") {
            self.config.credentials.servicenow_path = path.into();
        }

        if let Ok(dir) = env::var("PROXY_QUERIES_DIR") {
            self.config.queries_dir = dir.into();
        }

        if let Ok(secs) = env::var("PROXY_IDLE_TIMEOUT_SECS") {
            self.config.connection.idle_timeout =
                Duration::from_secs(parse_number("PROXY_IDLE_TIMEOUT_SECS", &secs)?);
        }

        if let Ok(secs) = env::var("PROXY_CONNECT_TIMEOUT_SECS") {
            self.config.connection.connect_timeout =
                Duration::from_secs(parse_number("PROXY_CONNECT_TIMEOUT_SECS", &secs)?);
        }

        if let Ok(limit) = env::var("PROXY_SN_RESULT_LIMIT") {
            self.config.ticketing.result_limit = parse_number("PROXY_SN_RESULT_LIMIT", &limit)?;
        }

        if let Ok(secs) = env::var("PROXY_HTTP_TIMEOUT_SECS") {
            self.config.ticketing.request_timeout =
                Duration::from_secs(parse_number("PROXY_HTTP_TIMEOUT_SECS", &secs)?);
        }

        if let Ok(level) = env::var("PROXY_LOG_LEVEL") {
            self.config.logging.level = level;
        }

        if let Ok(dir) = env::var("PROXY_LOG_DIR")
            && !dir.trim().is_empty()
        {
            self.config.logging.dir = Some(dir.into());
        }

        Ok(self)
    }

    pub fn build(self) -> Result<ProxyConfig> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.credentials.db_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("credentials.db_path".into()).into());
        }
        if self.config.credentials.servicenow_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("credentials.servicenow_path".into()).into());
        }
        if self.config.queries_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("queries_dir".into()).into());
        }
        if self.config.connection.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "connection.idle_timeout".into(),
                message: "Idle timeout must be greater than 0".into(),
            }
            .into());
        }
        if self.config.ticketing.result_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ticketing.result_limit".into(),
                message: "Result limit must be greater than 0".into(),
            }
            .into());
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        McpError::Config(ConfigError::InvalidValue {
            field: field.into(),
            message: format!("Invalid number: {}", raw).into(),
        })
    })
}
