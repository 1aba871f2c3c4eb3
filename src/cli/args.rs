use clap::{Args, Parser, Subcommand, ValueEnum};

/// statewipe: back up, reset and restore per-user state of Cursor and Windsurf
#[derive(Parser, Debug)]
#[command(
    name = "statewipe",
    version,
    about = "Back up, reset and restore per-user state of Cursor and Windsurf",
    long_about = "statewipe finds the per-user data of Cursor and Windsurf, takes a verified\n\
                   snapshot of every store it will touch, then resets telemetry identifiers,\n\
                   removes session records and empties caches. Every run can be undone.",
    after_help = "EXAMPLES:\n  \
        statewipe discover                      Show what would be touched\n  \
        statewipe clean cursor --dry-run        Plan a clean without writing\n  \
        statewipe clean --all --yes             Clean every installed application\n  \
        statewipe backups list                  List snapshots\n  \
        statewipe restore --last cursor         Undo the last Cursor clean\n  \
        statewipe purge --expired               Remove snapshots past retention"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output (debug logging to stderr)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode: minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve data directories and classify stores (read-only)
    Discover {
        /// Application name (default: all)
        app: Option<String>,
    },

    /// Back up, then reset identifiers, purge records and empty caches
    Clean {
        #[command(flatten)]
        target: AppTarget,

        /// Show what would be cleaned without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Restore a snapshot over the current state
    Restore {
        /// Restore the most recent complete snapshot of this application
        #[arg(long, value_name = "APP", conflicts_with = "snapshot", required_unless_present = "snapshot")]
        last: Option<String>,

        /// Specific snapshot ID to restore
        #[arg(long, value_name = "ID")]
        snapshot: Option<String>,

        /// Restore the verified entries of an incomplete snapshot
        #[arg(long)]
        allow_incomplete: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Inspect and discard snapshots
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },

    /// Remove snapshots
    Purge {
        /// Only purge complete snapshots past the retention window
        #[arg(long, conflicts_with = "snapshot", required_unless_present = "snapshot")]
        expired: bool,

        /// Purge a specific snapshot by ID
        #[arg(long, value_name = "ID")]
        snapshot: Option<String>,

        /// Skip confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

/// One named application, or every known one
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct AppTarget {
    /// Application name (cursor, windsurf, or a user profile)
    pub app: Option<String>,

    /// Every known application
    #[arg(long)]
    pub all: bool,
}

#[derive(Subcommand, Debug)]
pub enum BackupsAction {
    /// List all snapshots, most recent first
    List,

    /// Show the entries of one snapshot
    Show {
        /// Snapshot ID
        id: String,
    },

    /// Delete an incomplete snapshot left by an interrupted run
    Discard {
        /// Snapshot ID
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Initialize statewipe directories and default config
    Init,

    /// Reset to default configuration
    Reset,

    /// Print the config file path
    Path,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}
