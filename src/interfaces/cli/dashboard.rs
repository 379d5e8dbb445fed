use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::application::use_cases::dashboard::{
    DashboardLimits, DashboardOptions, DashboardUseCase, DEFAULT_OUTPUT_DIR,
};
use crate::domain::dashboard::DashboardManifest;
use crate::domain::error::Result;
use crate::infrastructure::config::ConfigService;
use crate::infrastructure::db::connect_pool;

use super::DbArgs;

#[derive(Parser, Debug)]
#[command(
    name = "snap-dashboard",
    about = "Run the catalog reports and write them as CSV files"
)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Product to build the product-specific reports for.
    #[arg(long)]
    pub product_asin: Option<String>,

    /// Directory the CSV files and dashboard.json are written to.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Row limit applied to every list and per-group report.
    #[arg(long)]
    pub limit: Option<i64>,

    /// Write the files only, no console tables.
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

impl DashboardArgs {
    pub fn to_options(&self) -> DashboardOptions {
        DashboardOptions {
            product_asin: self.product_asin.clone(),
            output_dir: self.output.clone(),
            limits: self
                .limit
                .map(DashboardLimits::uniform)
                .unwrap_or_default(),
            print_tables: !self.quiet,
        }
    }
}

pub async fn run(args: DashboardArgs) -> Result<DashboardManifest> {
    let options = args.to_options();
    options.validate()?;

    let settings = ConfigService::load(args.db.config.as_deref(), &args.db.to_overrides())?;
    info!(db = %settings.describe(), "connecting");

    let pool = connect_pool(&settings).await?;
    let result = DashboardUseCase::new(&pool).run(&options).await;
    pool.close().await;
    result
}
