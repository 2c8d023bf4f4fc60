use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "noted")]
#[command(about = "Offline-first notes from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for API and session configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Quick capture: noted "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(short, long)]
        title: Option<String>,
        /// Note color (e.g. #ffeb3b)
        #[arg(long, value_name = "COLOR")]
        color: Option<String>,
        /// Note content
        content: Vec<String>,
    },
    /// List notes, most recently updated first
    #[command(alias = "ls")]
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Show archived notes instead of active ones
        #[arg(long, conflicts_with = "all")]
        archived: bool,
        /// Show active and archived notes
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single note
    Show {
        /// Local note ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note (opens $EDITOR when no fields are given)
    Edit {
        /// Local note ID or unique ID prefix
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New content
        #[arg(short, long)]
        content: Option<String>,
        /// New color
        #[arg(long, value_name = "COLOR")]
        color: Option<String>,
    },
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Local note ID or unique ID prefix
        id: String,
    },
    /// Archive a note
    Archive {
        /// Local note ID or unique ID prefix
        id: String,
    },
    /// Restore an archived note
    Unarchive {
        /// Local note ID or unique ID prefix
        id: String,
    },
    /// Push queued changes and pull remote notes
    Sync,
    /// Push one note to the server immediately
    Retry {
        /// Local note ID or unique ID prefix
        id: String,
    },
    /// Show connectivity, session and queue status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List sync conflicts resolved in favour of local edits
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export notes
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormatArg::Json)]
        format: ExportFormatArg,
        /// Include archived notes
        #[arg(long)]
        include_archived: bool,
        /// Omit timestamps and sync metadata
        #[arg(long)]
        no_metadata: bool,
        /// Output file or directory (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the session used for sync
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormatArg {
    Json,
    Csv,
    Txt,
    Markdown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize (defaults to the selected profile)
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
        /// Notes API base URL (e.g. <http://localhost:4000>)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show configured profiles
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a session id and bearer token for the profile
    Login {
        /// Session identifier issued by the auth provider
        #[arg(long, value_name = "ID")]
        session_id: String,
        /// Bearer token for the session
        #[arg(long, value_name = "TOKEN")]
        token: String,
    },
    /// Show auth status for profile
    Status,
    /// Forget the profile session and its stored token
    Logout,
}
