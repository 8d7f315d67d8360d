use clap::Parser;
use statsync::args::{Args, Command};
use statsync::{commands, Config, Library, Mode, Result};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().statsync_home().path();

    // This allows for testing the program without hitting the marketplace or the rate service.
    // When STATSYNC_IN_TEST_MODE is set and non-zero in length, then the mode will be
    // Mode::Testing, otherwise it will be Mode::Live.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.username()).await?.print(),

        Command::Sync(sync_args) => {
            let library = open(home, mode).await?;
            commands::sync(&library, sync_args.reload()).await?.print()
        }

        Command::Currency(currency_args) => {
            let library = open(home, mode).await?;
            let code = if currency_args.base() {
                None
            } else {
                currency_args.code()
            };
            commands::currency(&library, code).await?.print()
        }

        Command::RatesKey(key_args) => {
            let library = open(home, mode).await?;
            commands::rates_key(&library, key_args.key()).await?.print()
        }

        Command::Stats => {
            let library = open(home, mode).await?;
            commands::stats(&library).await?.print()
        }

        Command::Watch(watch_args) => {
            let library = Arc::new(open(home, mode).await?);
            commands::watch(library, watch_args.auto_refresh(), watch_args.every())
                .await?
                .print()
        }

        Command::Reset => {
            let library = open(home, mode).await?;
            commands::reset(&library).await?.print()
        }
    };
    Ok(())
}

async fn open(home: &Path, mode: Mode) -> Result<Library> {
    let config = Config::load(home).await?;
    Library::open(&config, mode)
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
