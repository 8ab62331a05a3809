//! Lorebook CLI - keep markdown lore documents in a local store and sync them
//! with a GitHub repository.

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::search::run_search;
use crate::commands::show::run_show;
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_resolve};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lorebook_core=info,lorebook_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add {
            content,
            title,
            tags,
            push,
        }) => run_add(&content, title.as_deref(), &tags, push, &db_path).await?,
        Some(Commands::Show { id, json }) => run_show(&id, json, &db_path).await?,
        Some(Commands::List { limit, tag, json }) => {
            run_list(limit, tag.as_deref(), json, &db_path).await?;
        }
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, &db_path).await?;
        }
        Some(Commands::Edit { id, title, push }) => {
            run_edit(&id, title.as_deref(), push, &db_path).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Sync { command, json }) => match command {
            None => run_sync(json, &db_path).await?,
            Some(SyncCommands::Conflicts { json }) => run_sync_conflicts(json, &db_path).await?,
            Some(SyncCommands::Resolve { id, policy }) => {
                run_sync_resolve(&id, policy.into(), &db_path).await?;
            }
        },
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
