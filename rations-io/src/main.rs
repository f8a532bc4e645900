use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rations::builder::Builder;
use rations::config::DEFAULT_CONFIG_FILE;
use rations::service::MenuService;

#[derive(Parser)]
#[command(
    name = "rations-io",
    version,
    about = "Fetches the daily menus of all dining halls and assigns stable food ids"
)]
struct Cli {
    /// The YAML file to read the settings from.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Logs progress and upstream problems to stdout.
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prints the menus of a date as JSON
    Menus {
        /// The date to fetch (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Ignores any cached snapshot.
        #[arg(long)]
        refresh: bool,
    },
    /// Computes the menus of the next days and prints the cache status as JSON
    Warm {
        /// The number of days to warm, starting with today.
        #[arg(long, default_value_t = 2)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut builder = Builder::new()
        .enable_signals()
        .with_config_file(cli.config)
        .enable_menus();
    if cli.verbose {
        builder = builder.enable_logging();
    }

    let platform = builder.build().await?;
    let service = platform.require::<MenuService>();

    match cli.cmd {
        Command::Menus { date, refresh } => {
            let date = date.unwrap_or_else(|| service.today());
            let response = service.menus(date, refresh).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Warm { days } => {
            let dates = rations::warmer::upcoming_dates(service.today(), days);
            let warmed = rations::warmer::warm_dates(service.clone(), dates).await?;
            log::info!("Warmed {} of {} day(s).", warmed, days);
            println!("{}", serde_json::to_string_pretty(&service.status())?);
        }
    }

    platform.terminate();
    Ok(())
}
