//! Noted CLI - offline-first notes from the terminal
//!
//! Notes are written to a local store first and synced with the Noted API
//! when it is reachable and a session is configured.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::{CommandFactory, Parser};
use noted_core::export::ExportOptions;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::archive::run_set_archived;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::ClientOptions;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, NoteEdits};
use crate::commands::export::run_export;
use crate::commands::list::{run_list, run_show};
use crate::commands::sync::{run_conflicts, run_retry, run_status, run_sync};
use crate::error::CliError;

const DEFAULT_LOG_DIRECTIVE: &str = "noted=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let options = ClientOptions {
        db_path: cli.db_path,
        profile: cli.profile,
    };

    match cli.command {
        Some(Commands::Add {
            title,
            color,
            content,
        }) => run_add(title.as_deref(), color.as_deref(), &content, &options).await?,
        Some(Commands::List {
            limit,
            archived,
            all,
            json,
        }) => run_list(limit, archived, all, json, &options).await?,
        Some(Commands::Show { id, json }) => run_show(&id, json, &options).await?,
        Some(Commands::Edit {
            id,
            title,
            content,
            color,
        }) => {
            let edits = NoteEdits {
                title,
                content,
                color,
            };
            run_edit(&id, edits, &options).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &options).await?,
        Some(Commands::Archive { id }) => run_set_archived(&id, true, &options).await?,
        Some(Commands::Unarchive { id }) => run_set_archived(&id, false, &options).await?,
        Some(Commands::Sync) => run_sync(&options).await?,
        Some(Commands::Retry { id }) => run_retry(&id, &options).await?,
        Some(Commands::Status { json }) => run_status(json, &options).await?,
        Some(Commands::Conflicts { limit, json }) => run_conflicts(limit, json, &options).await?,
        Some(Commands::Export {
            format,
            include_archived,
            no_metadata,
            output,
        }) => {
            let export_options = ExportOptions {
                format: format.into(),
                include_archived,
                include_metadata: !no_metadata,
            };
            run_export(export_options, output.as_deref(), &options).await?;
        }
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        Some(Commands::Config { command }) => run_config(command, options.profile.as_deref())?,
        Some(Commands::Auth { command }) => run_auth(command, options.profile.as_deref())?,
        None => {
            // Quick capture mode: noted "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(None, None, &cli.note, &options).await?;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
