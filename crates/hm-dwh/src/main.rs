//! CLI binary entry point for hm-dwh

mod commands;
mod error;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::load::{LoadArgs, handle_load};

#[derive(Parser)]
#[command(name = "hm-dwh")]
#[command(about = "Load the H&M 2019 extract into a PostgreSQL star schema")]
#[command(version)]
struct Cli {
    /// Zip archive holding transactions, customers, articles and weather CSVs
    #[arg(long, required_unless_present = "sample_config")]
    zip: Option<PathBuf>,
    /// PostgreSQL host [default: localhost]
    #[arg(long)]
    host: Option<String>,
    /// PostgreSQL port [default: 5432]
    #[arg(long)]
    port: Option<u16>,
    /// Database name
    #[arg(long)]
    db: Option<String>,
    /// Database user
    #[arg(long)]
    user: Option<String>,
    /// Database password
    #[arg(long)]
    password: Option<String>,
    /// Schema for staging and star-schema tables [default: hm_dwh]
    #[arg(long)]
    schema: Option<String>,
    /// Drop and recreate all tables before loading
    #[arg(long)]
    reset: bool,
    /// Commit every database stage in one transaction
    #[arg(long)]
    single_transaction: bool,
    /// Calendar year generated into dim_date [default: 2019]
    #[arg(long)]
    year: Option<i32>,
    /// Rows fetched per round trip while transforming customers [default: 200000]
    #[arg(long)]
    fetch_size: Option<i32>,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
    /// Print a sample configuration file and exit
    #[arg(long)]
    sample_config: bool,
}

impl Cli {
    fn into_load_args(self, archive: PathBuf) -> LoadArgs {
        LoadArgs {
            archive,
            host: self.host,
            port: self.port,
            database: self.db,
            user: self.user,
            password: self.password,
            schema: self.schema,
            reset: self.reset,
            single_transaction: self.single_transaction,
            year: self.year,
            fetch_size: self.fetch_size,
            config_file: self.config,
            report: self.report,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let mut cli = Cli::parse();

    if cli.sample_config {
        print!("{}", hm_dwh_core::sample_config());
        return;
    }

    init_tracing();

    let Some(archive) = cli.zip.take() else {
        eprintln!("Error: --zip is required");
        std::process::exit(1);
    };

    if let Err(e) = handle_load(&cli.into_load_args(archive)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
