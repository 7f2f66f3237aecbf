//! notesync CLI
//!
//! Command-line client for a shared notes server: one-shot note commands,
//! a live `watch` view of the push channel, and debounced `edit` sessions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use notesync_core::{Config, NoteStatus};

mod commands;
mod output;

use commands::notes::NoteFields;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "notesync")]
#[command(about = "notesync - keep a local view of a shared notes server")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List notes grouped by status
    #[command(alias = "ls")]
    List {
        /// Only show one status group
        #[arg(short, long)]
        status: Option<NoteStatus>,
    },
    /// Create a note
    Add {
        /// Note title
        #[arg(short = 'T', long)]
        title: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Change fields of a note
    Update {
        /// Note ID
        id: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        #[command(flatten)]
        fields: FieldArgs,
        /// Remove the reminder
        #[arg(long, conflicts_with = "reminder")]
        clear_reminder: bool,
    },
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Note ID
        id: String,
    },
    /// Replace a note's content from stdin, one line per edit
    Edit {
        /// Note ID
        id: String,
    },
    /// Follow live changes from the server
    Watch,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args)]
struct FieldArgs {
    /// Note content
    #[arg(short, long)]
    content: Option<String>,
    /// Priority (lower sorts first)
    #[arg(short, long)]
    priority: Option<i64>,
    /// Status: active, hold or finished
    #[arg(short, long)]
    status: Option<NoteStatus>,
    /// Reminder time, e.g. 2024-05-01T10:00
    #[arg(short, long)]
    reminder: Option<String>,
}

impl FieldArgs {
    fn into_fields(self, title: Option<String>, clear_reminder: bool) -> NoteFields {
        NoteFields {
            title,
            content: self.content,
            priority: self.priority,
            status: self.status,
            reminder: self.reminder,
            clear_reminder,
        }
    }
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, ws_url, edit_debounce_ms, reconnect_delay_ms)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config_path = cli.config.unwrap_or_else(Config::config_file_path);
    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;

    match cli.command {
        Commands::List { status } => commands::notes::list(&config, status, &output).await,
        Commands::Add { title, fields } => {
            commands::notes::add(&config, title, fields.into_fields(None, false), &output).await
        }
        Commands::Update {
            id,
            title,
            fields,
            clear_reminder,
        } => {
            let fields = fields.into_fields(title, clear_reminder);
            commands::notes::update(&config, id, fields, &output).await
        }
        Commands::Delete { id } => commands::notes::delete(&config, id, &output).await,
        Commands::Edit { id } => commands::edit::edit(&config, id, &output).await,
        Commands::Watch => commands::watch::watch(&config, &output).await,
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(&config, &config_path, &output)
            }
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, &config_path, &output)
            }
        },
    }
}

/// Log to stderr so stdout stays clean for --json
///
/// The level comes from NOTESYNC_LOG and defaults to warn.
fn init_logging() {
    let level = std::env::var("NOTESYNC_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::new(format!("notesync_core={},notesync_cli={}", level, level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
