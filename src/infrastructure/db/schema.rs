use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::is_plain_identifier;
use sqlx::postgres::{PgConnection, PgPool};
use tracing::{info, warn};

const CATALOG_SCHEMA: &str = include_str!("../../../resources/snap/schema.sql");

/// Tables of the catalog, children before parents.
pub const CATALOG_TABLES: [&str; 6] = [
    "review",
    "product_similar",
    "product_category",
    "category",
    "customer",
    "product",
];

/// Split the schema resource into executable statements.
pub fn schema_statements() -> Vec<&'static str> {
    CATALOG_SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

/// Drop every catalog table and recreate the schema from scratch on `conn`.
///
/// Runs inside the caller's transaction, so a load that fails later leaves
/// the previous catalog untouched. When `schema` is set it is created first
/// so the connection's `search_path` resolves to it.
pub async fn reset_schema(conn: &mut PgConnection, schema: Option<&str>) -> Result<()> {
    if let Some(schema) = schema {
        if !is_plain_identifier(schema) {
            return Err(AppError::ValidationError(format!(
                "Invalid schema name: {}",
                schema
            )));
        }
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to create schema {schema}: {e}"))
            })?;
    }

    let drop = format!("DROP TABLE IF EXISTS {} CASCADE", CATALOG_TABLES.join(", "));
    sqlx::query(&drop)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to drop catalog tables: {e}")))?;

    for stmt in schema_statements() {
        sqlx::query(stmt)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to apply catalog schema: {e}")))?;
    }

    info!(tables = CATALOG_TABLES.len(), "catalog schema recreated");
    Ok(())
}

/// Fail with `NotFound` unless every catalog table exists in the current schema.
pub async fn verify_schema(pool: &PgPool) -> Result<()> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema()",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::DatabaseError(format!("Failed to inspect catalog tables: {e}")))?;

    let missing: Vec<&str> = CATALOG_TABLES
        .iter()
        .copied()
        .filter(|table| !present.iter().any(|p| p == table))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        warn!(missing = ?missing, "catalog schema incomplete");
        Err(AppError::NotFound(format!(
            "catalog tables missing: {} (run snap-load first)",
            missing.join(", ")
        )))
    }
}
