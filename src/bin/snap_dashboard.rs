use clap::Parser;
use tracing::{error, info};

use snapcat_lib::interfaces::cli::{self, dashboard::DashboardArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    cli::init_tracing();

    let args = DashboardArgs::parse();
    match cli::dashboard::run(args).await {
        Ok(manifest) => info!(reports = manifest.reports.len(), "dashboard complete"),
        Err(err) => {
            error!(error = %err, "dashboard failed");
            std::process::exit(1);
        }
    }
}
