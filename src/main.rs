use budget_engine::args::{Args, Command, ReassignSubcommand};
use budget_engine::{commands, Config, ErrorType, Result};
use clap::Parser;
use std::process::ExitCode;
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
            error!("Exiting with error [{}]: {e}", e.code());
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().budget_home().path();

    let _: () = match args.command() {
        Command::Init => commands::init(home).await?.print(),

        Command::Import(import_args) => {
            commands::import(load(home).await?, import_args.clone())
                .await?
                .print()
        }

        Command::Allocate(allocate_args) => {
            commands::allocate(load(home).await?, allocate_args.clone())
                .await?
                .print()
        }

        Command::Periods(periods_args) => {
            commands::periods(load(home).await?, periods_args.clone())
                .await?
                .print()
        }

        Command::Validate(validate_args) => {
            commands::validate(load(home).await?, validate_args.clone())
                .await?
                .print()
        }

        Command::Reassign(reassign_args) => {
            let config = load(home).await?;
            match reassign_args.trigger() {
                ReassignSubcommand::Categories(args) => {
                    commands::reassign_categories(config, args.clone())
                        .await?
                        .print()
                }
                ReassignSubcommand::Deleted(args) => {
                    commands::reassign_deleted(config, args.clone())
                        .await?
                        .print()
                }
            }
        }
    };
    Ok(())
}

async fn load(home: &std::path::Path) -> Result<Config> {
    Config::load(home)
        .await
        .map_err(|e| budget_engine::Error::new(ErrorType::Config, e))
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for the binary and library only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_PKG_NAME").replace('-', "_"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
