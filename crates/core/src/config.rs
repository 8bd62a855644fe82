//! Loader configuration file support
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `HM_DWH_*` environment variables. Command-line flags are applied last by
//! the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::warehouse::{DEFAULT_COVERED_YEAR, DEFAULT_FETCH_SIZE, DEFAULT_SCHEMA};

/// Environment variable for the server host
pub const ENV_HOST: &str = "HM_DWH_HOST";

/// Environment variable for the server port
pub const ENV_PORT: &str = "HM_DWH_PORT";

/// Environment variable for the database name
pub const ENV_DATABASE: &str = "HM_DWH_DATABASE";

/// Environment variable for the database user
pub const ENV_USER: &str = "HM_DWH_USER";

/// Environment variable for the database password
pub const ENV_PASSWORD: &str = "HM_DWH_PASSWORD";

/// Environment variable for the warehouse schema
pub const ENV_SCHEMA: &str = "HM_DWH_SCHEMA";

/// Environment variable enabling single-transaction mode
pub const ENV_SINGLE_TRANSACTION: &str = "HM_DWH_SINGLE_TRANSACTION";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: None,
            user: None,
            password: None,
        }
    }
}

impl ConnectionSettings {
    /// Check that database and user are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("database"));
        }
        if self.user.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("user"));
        }
        if self.host.is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        Ok(())
    }

    /// Driver configuration for these settings
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .application_name("hm-dwh");
        if let Some(database) = &self.database {
            config.dbname(database);
        }
        if let Some(user) = &self.user {
            config.user(user);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }

    /// Connection target in `user@host:port/db` form, never including the password
    pub fn masked(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user.as_deref().unwrap_or(""),
            self.host,
            self.port,
            self.database.as_deref().unwrap_or("")
        )
    }
}

/// Warehouse load settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseSettings {
    /// Namespace holding staging and target tables
    pub schema: String,
    /// Calendar year generated into `dim_date`
    pub covered_year: i32,
    /// Run every database stage in one transaction
    pub single_transaction: bool,
    /// Rows fetched per round trip when streaming customers
    pub customer_fetch_size: i32,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            covered_year: DEFAULT_COVERED_YEAR,
            single_transaction: false,
            customer_fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

impl WarehouseSettings {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=9999).contains(&self.covered_year) {
            return Err(ConfigError::Invalid {
                name: "covered_year",
                reason: format!("{} is not a four-digit year", self.covered_year),
            });
        }
        if self.customer_fetch_size <= 0 {
            return Err(ConfigError::Invalid {
                name: "customer_fetch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub warehouse: WarehouseSettings,
}

impl LoaderConfig {
    /// Load configuration from an optional file and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                Self::parse(&content)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_HOST) {
            self.connection.host = host;
        }

        if let Some(port) = lookup(ENV_PORT)
            && let Ok(port) = port.parse()
        {
            self.connection.port = port;
        }

        if let Some(database) = lookup(ENV_DATABASE) {
            self.connection.database = Some(database);
        }

        if let Some(user) = lookup(ENV_USER) {
            self.connection.user = Some(user);
        }

        if let Some(password) = lookup(ENV_PASSWORD) {
            self.connection.password = Some(password);
        }

        if let Some(schema) = lookup(ENV_SCHEMA) {
            self.warehouse.schema = schema;
        }

        if let Some(flag) = lookup(ENV_SINGLE_TRANSACTION)
            && let Some(flag) = parse_flag(&flag)
        {
            self.warehouse.single_transaction = flag;
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# hm-dwh loader configuration
# Every value can also be set with an HM_DWH_* environment variable
# or on the command line.

[connection]
host = "localhost"
port = 5432
database = "hm"
user = "etl"
# Prefer HM_DWH_PASSWORD over storing the password here
# password = ""

[warehouse]
# Namespace for staging and star-schema tables
schema = "hm_dwh"

# Calendar year generated into dim_date
covered_year = 2019

# Commit all database stages together instead of one stage at a time
single_transaction = false

# Rows fetched per round trip while transforming customers
customer_fetch_size = 200000
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 5432);
        assert_eq!(config.warehouse.schema, "hm_dwh");
        assert_eq!(config.warehouse.covered_year, 2019);
        assert_eq!(config.warehouse.customer_fetch_size, 200_000);
        assert!(!config.warehouse.single_transaction);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = LoaderConfig::parse(
            r#"
[connection]
database = "hm"
user = "etl"

[warehouse]
schema = "sales"
"#,
        )
        .unwrap();
        assert_eq!(config.connection.database.as_deref(), Some("hm"));
        assert_eq!(config.connection.port, 5432);
        assert_eq!(config.warehouse.schema, "sales");
        assert_eq!(config.warehouse.covered_year, 2019);
    }

    #[test]
    fn test_parse_invalid_config() {
        let err = LoaderConfig::parse("[connection]\nport = \"not a port\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = LoaderConfig::parse(sample_config()).unwrap();
        assert_eq!(config.connection.user.as_deref(), Some("etl"));
        assert_eq!(config.warehouse, WarehouseSettings::default());
        assert!(config.connection.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_HOST, "db.internal"),
            (ENV_PORT, "6543"),
            (ENV_DATABASE, "hm"),
            (ENV_USER, "loader"),
            (ENV_PASSWORD, "secret"),
            (ENV_SCHEMA, "dwh"),
            (ENV_SINGLE_TRANSACTION, "true"),
        ]);
        let mut config = LoaderConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 6543);
        assert_eq!(config.connection.password.as_deref(), Some("secret"));
        assert_eq!(config.warehouse.schema, "dwh");
        assert!(config.warehouse.single_transaction);
    }

    #[test]
    fn test_env_overrides_ignore_unparseable_values() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_PORT, "abc"), (ENV_SINGLE_TRANSACTION, "maybe")]);
        let mut config = LoaderConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.connection.port, 5432);
        assert!(!config.warehouse.single_transaction);
    }

    #[test]
    fn test_connection_validation() {
        let mut settings = ConnectionSettings::default();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Missing("database"))
        ));
        settings.database = Some("hm".to_string());
        assert!(matches!(settings.validate(), Err(ConfigError::Missing("user"))));
        settings.user = Some("etl".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_masked_target_hides_password() {
        let settings = ConnectionSettings {
            database: Some("hm".to_string()),
            user: Some("etl".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let masked = settings.masked();
        assert_eq!(masked, "etl@localhost:5432/hm");
        assert!(!masked.contains("hunter2"));
    }

    #[test]
    fn test_warehouse_validation() {
        let mut settings = WarehouseSettings::default();
        assert!(settings.validate().is_ok());
        settings.customer_fetch_size = 0;
        assert!(settings.validate().is_err());
        settings.customer_fetch_size = 10;
        settings.covered_year = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = LoaderConfig::load(Some(Path::new("/nonexistent/hm-dwh.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
