mod commands;
mod config;
mod render;
mod routes;
mod state;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::query::QueryArgs;

#[derive(Parser)]
#[command(name = "evcal")]
#[command(about = "Search and page through an event calendar")]
struct Cli {
    /// Config file (defaults to ~/.config/evcal/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the calendar query API
    Serve {
        /// Address to bind (e.g. 127.0.0.1:4096)
        #[arg(long)]
        address: Option<String>,

        /// JSON dataset with events, venues and organizers
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Print one page of calendar results
    Query {
        /// JSON dataset with events, venues and organizers
        #[arg(long)]
        data: Option<PathBuf>,

        /// Free-text search over title, description, venue and organizer
        #[arg(short, long)]
        search: Option<String>,

        /// Named date window (today, tomorrow, this-week, this-weekend, ...)
        #[arg(long)]
        scope: Option<String>,

        /// Show events from this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Show events until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Page number, starting at 1
        #[arg(short, long)]
        page: Option<i64>,

        /// Show past events, most recent first
        #[arg(long)]
        past: bool,

        /// Category selection as group=id,id (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<String>,

        /// Only events near this point, as lat,lng
        #[arg(long, allow_hyphen_values = true)]
        near: Option<String>,

        /// Search radius around --near
        #[arg(long)]
        radius: Option<String>,

        /// Radius unit (mi or km)
        #[arg(long)]
        unit: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        Commands::Query { .. } => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { address, data } => {
            if let Some(address) = address {
                config.server.address = address;
            }
            if let Some(data) = data {
                config.server.data_file = data.to_string_lossy().into_owned();
            }
            commands::serve::run(config).await
        }
        Commands::Query {
            data,
            search,
            scope,
            from,
            to,
            page,
            past,
            categories,
            near,
            radius,
            unit,
        } => {
            if let Some(data) = data {
                config.server.data_file = data.to_string_lossy().into_owned();
            }
            let args = QueryArgs {
                search,
                scope,
                from,
                to,
                page,
                past,
                categories,
                near,
                radius,
                unit,
            };
            tokio::task::spawn_blocking(move || commands::query::run(config, args)).await?
        }
    }
}
