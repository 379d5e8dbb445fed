// ============================================================
// COMMAND LINE
// ============================================================
// Argument parsing and entry points of the snap-load and snap-dashboard binaries

pub mod dashboard;
pub mod load;

use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::DbOverrides;

/// Connection flags shared by both binaries. Anything left unset falls back
/// to the config file, then `SNAP_DB_*` variables, then built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct DbArgs {
    #[arg(long)]
    pub db_host: Option<String>,

    #[arg(long)]
    pub db_port: Option<u16>,

    #[arg(long)]
    pub db_name: Option<String>,

    #[arg(long)]
    pub db_user: Option<String>,

    #[arg(long)]
    pub db_pass: Option<String>,

    /// Schema the catalog tables live in (default: the server's search_path).
    #[arg(long)]
    pub db_schema: Option<String>,

    /// disable, allow, prefer, require, verify-ca or verify-full.
    #[arg(long)]
    pub db_ssl_mode: Option<String>,

    /// TOML file with a flat table of connection settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl DbArgs {
    pub fn to_overrides(&self) -> DbOverrides {
        DbOverrides {
            host: self.db_host.clone(),
            port: self.db_port,
            name: self.db_name.clone(),
            user: self.db_user.clone(),
            password: self.db_pass.clone(),
            schema: self.db_schema.clone(),
            ssl_mode: self.db_ssl_mode.clone(),
        }
    }
}

/// `RUST_LOG` wins over the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
