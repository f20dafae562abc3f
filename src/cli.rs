/// CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::config::Overrides;

// Build timestamp injected at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

pub fn get_version() -> &'static str {
    VERSION_WITH_BUILD
}

#[derive(Parser)]
#[command(name = "pgkeep-cli")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/pgkeep/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Delete backups that fall outside the retention policy
    Trim {
        /// Trim whole-cluster backups instead of per-database ones
        #[arg(long)]
        cluster: bool,

        /// Report what would be deleted without deleting anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Compare the catalog with the backed up databases afterwards
        #[arg(long)]
        pg_warnings: bool,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        policy: PolicyArgs,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// List the databases an operation would target, from the live catalog
    Select {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Report databases without backups and backups without databases
    Diff {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the default config file location
    Path,
}

#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// PostgreSQL host
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL user
    #[arg(short = 'U', long)]
    pub user: Option<String>,

    /// PostgreSQL port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Backup directory
    #[arg(short = 'd', long)]
    pub backup_dir: Option<PathBuf>,

    /// Filename prefix of the backups to consider
    #[arg(long)]
    pub prefix: Option<String>,

    /// Only these databases; replaces every include/exclude setting
    #[arg(long = "db-name", value_delimiter = ',')]
    pub db_names: Vec<String>,

    /// Only databases owned by this role
    #[arg(long)]
    pub db_owner: Option<String>,

    /// Keep template databases in the catalog
    #[arg(long)]
    pub include_templates: bool,
}

#[derive(Args, Debug, Default)]
pub struct PolicyArgs {
    /// Most recent backups that are never deleted
    #[arg(long)]
    pub min_backups: Option<usize>,

    /// Delete backups older than this many days (0 disables)
    #[arg(long)]
    pub expiry_days: Option<u32>,

    /// Size budget for retained backups, e.g. 500MB or 20GB (0 disables)
    #[arg(long)]
    pub max_size: Option<String>,
}

impl Cli {
    /// Overrides shared by every command.
    pub fn base_overrides(&self) -> Overrides {
        Overrides {
            log_level: self.log_level.clone(),
            ..Default::default()
        }
    }
}

impl ConnectionArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        overrides.host = self.host.clone();
        overrides.user = self.user.clone();
        overrides.port = self.port;
    }
}

impl TargetArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        overrides.backup_dir = self.backup_dir.clone();
        overrides.prefix = self.prefix.clone();
        overrides.db_names = self.db_names.clone();
        overrides.db_owner = self.db_owner.clone();
        if self.include_templates {
            overrides.exclude_templates = Some(false);
        }
    }
}

impl PolicyArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        overrides.min_backups = self.min_backups;
        overrides.expiry_days = self.expiry_days;
        overrides.max_size = self.max_size.clone();
    }
}
