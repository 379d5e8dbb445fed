use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::application::use_cases::load_catalog::{
    scan_catalog, LoadCatalogUseCase, LoadOptions, LoadSummary, DEFAULT_BATCH_SIZE,
    DEFAULT_PROGRESS_EVERY,
};
use crate::domain::error::Result;
use crate::infrastructure::config::ConfigService;
use crate::infrastructure::db::connect_pool;

use super::DbArgs;

#[derive(Parser, Debug)]
#[command(
    name = "snap-load",
    about = "Load the SNAP Amazon product co-purchasing metadata into Postgres"
)]
pub struct LoadArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Path to amazon-meta.txt (or amazon-meta.txt.gz).
    #[arg(long)]
    pub input: PathBuf,

    /// Product records per round of multi-row inserts.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Log progress every N records (0 disables).
    #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY)]
    pub progress_every: u64,

    /// Parse the whole file and report counts without touching the database.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl LoadArgs {
    pub fn to_options(&self) -> LoadOptions {
        LoadOptions {
            input: self.input.clone(),
            batch_size: self.batch_size,
            progress_every: self.progress_every,
            dry_run: self.dry_run,
        }
    }
}

pub async fn run(args: LoadArgs) -> Result<LoadSummary> {
    let options = args.to_options();
    options.validate()?;

    if options.dry_run {
        info!(input = %options.input.display(), "dry run, database untouched");
        return scan_catalog(&options);
    }

    let mut settings = ConfigService::load(args.db.config.as_deref(), &args.db.to_overrides())?;
    // One transaction, one connection.
    settings.max_connections = 1;
    info!(db = %settings.describe(), "connecting");

    let pool = connect_pool(&settings).await?;
    let use_case = LoadCatalogUseCase::new(&pool, settings.schema.clone());
    let result = use_case.run(&options).await;
    pool.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_flags() {
        let args = LoadArgs::try_parse_from([
            "snap-load",
            "--db-host",
            "localhost",
            "--db-name",
            "snap",
            "--db-user",
            "loader",
            "--db-pass",
            "pw",
            "--db-schema",
            "amazon",
            "--input",
            "amazon-meta.txt.gz",
            "--batch-size",
            "250",
        ])
        .unwrap();

        assert_eq!(args.db.db_host.as_deref(), Some("localhost"));
        assert_eq!(args.db.db_schema.as_deref(), Some("amazon"));
        assert!(args.db.db_port.is_none());

        let options = args.to_options();
        assert_eq!(options.batch_size, 250);
        assert_eq!(options.progress_every, DEFAULT_PROGRESS_EVERY);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_input_is_required() {
        assert!(LoadArgs::try_parse_from(["snap-load", "--db-host", "localhost"]).is_err());
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_connecting() {
        let args = LoadArgs::try_parse_from([
            "snap-load",
            "--db-host",
            "unreachable.invalid",
            "--input",
            "/no/such/amazon-meta.txt",
        ])
        .unwrap();

        let err = run(args).await.unwrap_err();
        assert!(matches!(err, crate::domain::error::AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_dry_run_skips_database() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("amazon-meta.txt");
        std::fs::write(
            &input,
            "Total items: 1\n\nId:   0\nASIN: 0771044445\n  discontinued product\n",
        )
        .unwrap();

        let args = LoadArgs::try_parse_from([
            "snap-load",
            "--db-host",
            "unreachable.invalid",
            "--input",
            input.to_str().unwrap(),
            "--dry-run",
        ])
        .unwrap();

        let summary = run(args).await.unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.products, 1);
    }
}
