use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::DbSettings;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::time::Duration;
use tracing::{error, info};

/// Parse SSL mode string to PgSslMode
pub fn parse_ssl_mode(ssl_mode: &str) -> PgSslMode {
    match ssl_mode.to_lowercase().as_str() {
        "disable" => PgSslMode::Disable,
        "allow" => PgSslMode::Allow,
        "prefer" => PgSslMode::Prefer,
        "require" => PgSslMode::Require,
        "verify-ca" => PgSslMode::VerifyCa,
        "verify-full" => PgSslMode::VerifyFull,
        _ => PgSslMode::Prefer,
    }
}

pub fn build_pg_options(settings: &DbSettings) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(&settings.name)
        .username(&settings.user)
        .password(&settings.password)
        .ssl_mode(parse_ssl_mode(&settings.ssl_mode))
        .application_name("snapcat");

    match &settings.schema {
        Some(schema) => options.options([("search_path", schema.as_str())]),
        None => options,
    }
}

/// Open a pool and make sure the server answers before handing it out.
pub async fn connect_pool(settings: &DbSettings) -> Result<PgPool> {
    settings.validate()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .connect_with(build_pg_options(settings))
        .await
        .map_err(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            AppError::DatabaseError(format!(
                "Failed to connect to {}: {}",
                settings.describe(),
                e
            ))
        })?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {e}")))?;

    info!(db = %settings.describe(), "connected to PostgreSQL");
    Ok(pool)
}
