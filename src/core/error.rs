/// Domain errors for selection, catalog access and configuration
///
/// Warnings that never abort a run (unparseable names, failed removals)
/// live in `trimmer::TrimWarning` instead.

use std::path::PathBuf;

/// An explicitly requested database is missing from the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("database(s) not found in catalog: {}", .0.join(", "))]
    UnknownDatabases(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to run psql: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("psql exited with {status}: {stderr}")]
    QueryFailed { status: String, stderr: String },

    #[error("malformed catalog row: {line:?}")]
    MalformedRow { line: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {field} pattern {pattern:?}: {source}")]
    InvalidRegex {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid size {0:?} (expected e.g. 500MB, 10GB or a byte count)")]
    InvalidSize(String),

    #[error("backup directory is not set (use --backup-dir or [trim] backup_dir)")]
    MissingBackupPath,
}
