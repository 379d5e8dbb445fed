use clap::Parser;
use tracing::error;

use snapcat_lib::interfaces::cli::{self, load::LoadArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    cli::init_tracing();

    let args = LoadArgs::parse();
    match cli::load::run(args).await {
        Ok(summary) => summary.log(),
        Err(err) => {
            error!(error = %err, "catalog load failed");
            std::process::exit(1);
        }
    }
}
