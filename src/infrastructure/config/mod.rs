use std::fmt;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::error::{AppError, Result};

/// Prefix of the environment variables read for connection settings.
pub const ENV_PREFIX: &str = "SNAP_DB_";

const SSL_MODES: [&str; 6] = [
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];

/// PostgreSQL connection settings shared by the loader and the dashboard.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    /// Schema placed first on the `search_path`; `None` keeps the server default.
    pub schema: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: String::new(),
            user: String::new(),
            password: String::new(),
            schema: None,
            ssl_mode: "prefer".to_string(),
            max_connections: 4,
            connect_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl DbSettings {
    /// `user@host:port/name`, safe to log.
    pub fn describe(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}@{}:{}/{} (schema {})",
                self.user, self.host, self.port, self.name, schema
            ),
            None => format!("{}@{}:{}/{}", self.user, self.host, self.port, self.name),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::ConfigError("database host is required".to_string()));
        }
        if self.port == 0 {
            return Err(AppError::ConfigError("database port must be non-zero".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::ConfigError("database name is required".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(AppError::ConfigError("database user is required".to_string()));
        }
        if self.max_connections == 0 {
            return Err(AppError::ConfigError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if !SSL_MODES.contains(&self.ssl_mode.to_lowercase().as_str()) {
            return Err(AppError::ConfigError(format!(
                "unknown ssl mode '{}'",
                self.ssl_mode
            )));
        }
        if let Some(schema) = &self.schema {
            if !is_plain_identifier(schema) {
                return Err(AppError::ConfigError(format!(
                    "schema '{}' must be a plain SQL identifier",
                    schema
                )));
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes (PostgreSQL's NAMEDATALEN - 1).
pub fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    value.len() <= 63
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Values given explicitly on the command line. Unset fields leave lower layers intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,
}

pub struct ConfigService;

impl ConfigService {
    /// Layer defaults, an optional TOML file, `SNAP_DB_*` variables and CLI
    /// overrides (later layers win), then validate the result.
    pub fn load(file: Option<&Path>, overrides: &DbOverrides) -> Result<DbSettings> {
        let mut figment = Figment::from(Serialized::defaults(DbSettings::default()));

        if let Some(path) = file {
            if !path.is_file() {
                return Err(AppError::ConfigError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let settings: DbSettings = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|e| AppError::ConfigError(format!("Failed to read settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn cli(host: &str, name: &str, user: &str) -> DbOverrides {
        DbOverrides {
            host: Some(host.to_string()),
            name: Some(name.to_string()),
            user: Some(user.to_string()),
            password: Some("secret".to_string()),
            ..DbOverrides::default()
        }
    }

    #[test]
    fn test_cli_overrides_env_and_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "snap.toml",
                r#"
                host = "file-host"
                port = 6543
                name = "file_db"
                user = "file_user"
                "#,
            )?;
            jail.set_env("SNAP_DB_HOST", "env-host");
            jail.set_env("SNAP_DB_SSL_MODE", "disable");

            let settings =
                ConfigService::load(Some(Path::new("snap.toml")), &cli("cli-host", "cli_db", "u"))
                    .expect("settings load");

            assert_eq!(settings.host, "cli-host");
            assert_eq!(settings.port, 6543);
            assert_eq!(settings.name, "cli_db");
            assert_eq!(settings.ssl_mode, "disable");
            assert_eq!(settings.password, "secret");
            Ok(())
        });
    }

    #[test]
    fn test_env_only_settings() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SNAP_DB_HOST", "db");
            jail.set_env("SNAP_DB_NAME", "amazon");
            jail.set_env("SNAP_DB_USER", "postgres");
            jail.set_env("SNAP_DB_SCHEMA", "snap_test");

            let settings =
                ConfigService::load(None, &DbOverrides::default()).expect("settings load");
            assert_eq!(settings.host, "db");
            assert_eq!(settings.port, 5432);
            assert_eq!(settings.schema.as_deref(), Some("snap_test"));
            assert_eq!(settings.describe(), "postgres@db:5432/amazon (schema snap_test)");
            Ok(())
        });
    }

    #[test]
    fn test_missing_required_fields() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let err = ConfigService::load(None, &DbOverrides::default()).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(ref msg) if msg.contains("name")));
            Ok(())
        });
    }

    #[test]
    fn test_missing_config_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let err = ConfigService::load(Some(Path::new("absent.toml")), &cli("h", "d", "u"))
                .unwrap_err();
            assert!(matches!(err, AppError::ConfigError(ref msg) if msg.contains("absent.toml")));
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = DbSettings {
            name: "amazon".to_string(),
            user: "postgres".to_string(),
            ..DbSettings::default()
        };
        assert!(base.validate().is_ok());

        let bad_port = DbSettings { port: 0, ..base.clone() };
        assert!(bad_port.validate().is_err());

        let bad_ssl = DbSettings {
            ssl_mode: "sometimes".to_string(),
            ..base.clone()
        };
        assert!(bad_ssl.validate().is_err());

        let bad_schema = DbSettings {
            schema: Some("public; DROP TABLE product".to_string()),
            ..base
        };
        assert!(bad_schema.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = DbSettings {
            password: "hunter2".to_string(),
            ..DbSettings::default()
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("snap_test_1"));
        assert!(is_plain_identifier("_x"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("a-b"));
    }
}
