use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Edit sites offline and keep them in step with the server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the local database (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage sites
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },
    /// Manage files inside a site
    File {
        #[command(subcommand)]
        command: FileCommands,
    },
    /// Reconcile local data with the server
    Sync {
        /// Keep running and sync whenever local data changes
        #[arg(long, conflicts_with = "dry_run")]
        watch: bool,
        /// Print the planned actions without applying them
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or write the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
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
}

#[derive(Subcommand)]
pub enum SiteCommands {
    /// Create a site
    #[command(alias = "new")]
    Add {
        /// Display name
        name: String,
        /// Address-like identifier (derived from the name when omitted)
        #[arg(long, value_name = "SLUG")]
        local_name: Option<String>,
    },
    /// List sites
    #[command(alias = "ls")]
    List {
        /// Include sites waiting for their deletion to sync
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a site
    Rename {
        /// Site ID or unique ID prefix
        id: String,
        /// New display name
        name: String,
    },
    /// Delete a site and its files
    #[command(alias = "delete")]
    Rm {
        /// Site ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum FileCommands {
    /// Create a file in a site
    #[command(alias = "new")]
    Add {
        /// Site ID or unique ID prefix
        site: String,
        /// File name, e.g. index.html
        name: String,
        /// File content (read from stdin or an editor when omitted)
        #[arg(long)]
        content: Option<String>,
    },
    /// List files
    #[command(alias = "ls")]
    List {
        /// Only files of this site (ID or unique ID prefix)
        #[arg(long, value_name = "SITE")]
        site: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a file's content
    Edit {
        /// File ID or unique ID prefix
        id: String,
        /// Replacement content (opens an editor when omitted)
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete a file
    #[command(alias = "delete")]
    Rm {
        /// File ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Server base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Owner whose sites are synced
        #[arg(long, value_name = "ID")]
        owner_id: Option<String>,
        /// Bearer token for the server
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
        /// Quiet period before a watched sync runs
        #[arg(long, value_name = "MS")]
        quiet_period_ms: Option<u64>,
        /// Whether the server requires a token (false for public endpoints)
        #[arg(long, value_name = "BOOL")]
        auth_required: Option<bool>,
    },
    /// Print the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
