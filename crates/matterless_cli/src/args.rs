//! Command-line surface of the `matterless` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Terminal Mattermost client with an offline message cache
#[derive(Parser, Debug)]
#[command(name = "matterless")]
#[command(about = "Terminal Mattermost client with an offline message cache", long_about = None)]
#[command(version)]
pub struct Args {
    /// Path to the JSON configuration file (default: <config dir>/matterless/config.json)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for cached data (default: <cache dir>/matterless)
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Log debug diagnostics to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection settings; each one overrides and updates the config file.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArgs {
    /// Server URL, e.g. chat.example.com
    #[arg(long, value_name = "URL", global = true)]
    pub url: Option<String>,

    /// Personal access token or session token
    #[arg(long, value_name = "TOKEN", global = true)]
    pub token: Option<String>,

    /// Username or email for password login
    #[arg(long, value_name = "LOGIN", global = true)]
    pub login_id: Option<String>,

    #[arg(long, value_name = "PASSWORD", global = true)]
    pub password: Option<String>,

    /// One-time MFA code for password login
    #[arg(long, value_name = "CODE", global = true)]
    pub mfa_token: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the logged-in user
    Me,
    /// List the teams of the logged-in user
    Teams,
    /// List channels with resolved display names
    Channels {
        /// Only list channels of this team
        #[arg(long, value_name = "TEAM_ID")]
        team: Option<String>,
    },
    /// Fetch new posts into the local cache
    Sync {
        /// Channel ids to sync
        #[arg(value_name = "CHANNEL")]
        channels: Vec<String>,

        /// Sync every channel of every team
        #[arg(long)]
        all: bool,

        /// Stop after this many pages per channel
        #[arg(long, value_name = "N")]
        max_pages: Option<usize>,

        /// Stop a channel's sync after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout_sec: Option<u64>,

        /// Page forward from the newest cached post instead of back from the latest
        #[arg(long)]
        forward: bool,
    },
    /// Print a channel's cached history without contacting the server
    Show {
        #[arg(value_name = "CHANNEL")]
        channel: String,

        #[arg(long, value_enum, default_value_t = HistoryOrder::Date)]
        order: HistoryOrder,
    },
    /// Manage the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

impl Command {
    /// Whether the command needs a server connection.
    #[must_use]
    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Show { .. } | Self::Cache { .. })
    }
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Delete every cached entry for the configured server
    Clear,
}

/// Display order for `show`.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryOrder {
    /// Oldest post first, by creation time
    #[default]
    Date,
    /// The order in which the server delivered the posts
    Server,
}
