use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "vaultbrief",
    about = "Find the notes in your markdown vault that matter for your next meeting"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect a vault directory, index it and remember it
    Connect {
        /// Path to the vault root
        path: PathBuf,
    },
    /// Forget the connected vault
    Disconnect,
    /// Show the connected vault and index size
    Status(StatusArgs),
    /// Full-text search across the vault
    Search(SearchArgs),
    /// Find notes relevant to a meeting
    Context(ContextArgs),
    /// Index the vault and keep it in sync until interrupted
    Watch {
        /// Vault to watch (defaults to the connected vault)
        path: Option<PathBuf>,
    },
    /// Print a note from the vault
    Read {
        /// Path to the note, absolute or relative to the vault root
        path: PathBuf,
    },
    /// Manage persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Context --

#[derive(Debug, Parser)]
pub struct ContextArgs {
    /// Meeting title
    #[arg(long)]
    pub title: String,

    /// Meeting description or invite body
    #[arg(long)]
    pub description: Option<String>,

    /// Attendee as "Name <email>", an email, or a name (repeatable)
    #[arg(short, long = "attendee")]
    pub attendees: Vec<String>,

    /// Meeting location
    #[arg(long)]
    pub location: Option<String>,

    /// Maximum number of notes to return
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Minimum relevance score in [0, 1]
    #[arg(long)]
    pub min_score: Option<f64>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print a setting
    Get { key: String },
    /// Store a setting
    Set { key: String, value: String },
    /// Remove a setting, reverting to its default
    Unset { key: String },
    /// List stored settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
