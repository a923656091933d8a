mod cli;
mod commands;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use vodio_api::{ApiClient, ApiConfig};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.api_base {
        Some(base) => ApiConfig::new(base)?,
        None => ApiConfig::from_env()?,
    };
    let client = Arc::new(ApiClient::new(&config)?);

    match args.command {
        Commands::List { limit, offset } => commands::list::run(&client, limit, offset).await,
        Commands::Show { id } => commands::list::show(&client, &id).await,
        Commands::Upload {
            title,
            description,
            video,
            thumbnail,
            pipeline,
            no_watch,
        } => {
            commands::upload::run(
                client,
                commands::upload::UploadArgs {
                    title,
                    description,
                    video,
                    thumbnail,
                    pipeline,
                    no_watch,
                },
            )
            .await
        }
        Commands::Watch {
            id,
            quality,
            output,
            stall_timeout,
        } => {
            commands::watch::run(
                client,
                commands::watch::WatchArgs {
                    id,
                    quality,
                    output,
                    stall_timeout,
                },
            )
            .await
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
