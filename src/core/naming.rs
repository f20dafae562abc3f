/// Backup filename convention
///
/// Grammar v1:
///
/// ```text
/// database: <prefix>db_<dbname>_<YYYYMMDD>_<HHMMSS>_<zone>.<ext>
/// cluster:  <prefix>ht_<server><port>_cluster_<YYYYMMDD>_<HHMMSS>_<zone>.<ext>
/// ext:      dump | gz | bz2 | zip
/// ```
///
/// `<dbname>` may itself contain underscores: the timestamp is anchored at
/// the end of the name, so the database is everything between `db_` and it.
/// A name that does not fit the grammar parses to `None`; that is ordinary
/// data for the caller, not an error.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::ffi::OsStr;
use std::fmt;
use std::sync::OnceLock;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Grammar revision understood by a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NamingScheme {
    #[default]
    V1,
}

impl fmt::Display for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingScheme::V1 => f.write_str("v1"),
        }
    }
}

/// Container format, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackupFormat {
    Dump,
    Gzip,
    Bzip2,
    Zip,
}

impl BackupFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            BackupFormat::Dump => "dump",
            BackupFormat::Gzip => "gz",
            BackupFormat::Bzip2 => "bz2",
            BackupFormat::Zip => "zip",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "dump" => Some(BackupFormat::Dump),
            "gz" => Some(BackupFormat::Gzip),
            "bz2" => Some(BackupFormat::Bzip2),
            "zip" => Some(BackupFormat::Zip),
            _ => None,
        }
    }
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BackupKind {
    Database(String),
    /// Whole-instance backup; `instance` is server and port run together.
    Cluster { instance: String },
}

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedName {
    pub kind: BackupKind,
    pub stamp: NaiveDateTime,
    pub zone: String,
    pub format: BackupFormat,
}

impl ParsedName {
    pub fn database(&self) -> Option<&str> {
        match &self.kind {
            BackupKind::Database(name) => Some(name),
            BackupKind::Cluster { .. } => None,
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.kind, BackupKind::Cluster { .. })
    }
}

fn database_re() -> &'static Regex {
    static DATABASE_RE: OnceLock<Regex> = OnceLock::new();
    DATABASE_RE.get_or_init(|| {
        Regex::new(r"^db_(.+)_(\d{8}_\d{6})_([A-Za-z0-9+\-]+)\.(dump|gz|bz2|zip)$").unwrap()
    })
}

fn cluster_re() -> &'static Regex {
    static CLUSTER_RE: OnceLock<Regex> = OnceLock::new();
    CLUSTER_RE.get_or_init(|| {
        Regex::new(r"^ht_(.+)_cluster_(\d{8}_\d{6})_([A-Za-z0-9+\-]+)\.(dump|gz|bz2|zip)$").unwrap()
    })
}

/// Encodes and decodes backup filenames for one configured prefix
#[derive(Debug, Clone, Default)]
pub struct NamingCodec {
    prefix: String,
    scheme: NamingScheme,
}

impl NamingCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            scheme: NamingScheme::V1,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn scheme(&self) -> NamingScheme {
        self.scheme
    }

    /// Whether a file belongs to this codec's namespace at all.
    pub fn has_prefix(&self, file_name: &OsStr) -> bool {
        file_name.as_encoded_bytes().starts_with(self.prefix.as_bytes())
    }

    pub fn parse(&self, file_name: &str) -> Option<ParsedName> {
        let rest = file_name.strip_prefix(self.prefix.as_str())?;

        let (caps, cluster) = match database_re().captures(rest) {
            Some(caps) => (caps, false),
            None => (cluster_re().captures(rest)?, true),
        };

        let subject = caps.get(1)?.as_str().to_string();
        let stamp = NaiveDateTime::parse_from_str(caps.get(2)?.as_str(), STAMP_FORMAT).ok()?;
        let zone = caps.get(3)?.as_str().to_string();
        let format = BackupFormat::from_extension(caps.get(4)?.as_str())?;

        let kind = if cluster {
            BackupKind::Cluster { instance: subject }
        } else {
            BackupKind::Database(subject)
        };

        Some(ParsedName { kind, stamp, zone, format })
    }

    pub fn format_database(&self, database: &str, stamp: NaiveDateTime, zone: &str, format: BackupFormat) -> String {
        format!(
            "{}db_{}_{}_{}.{}",
            self.prefix,
            database,
            stamp.format(STAMP_FORMAT),
            zone,
            format.extension()
        )
    }

    pub fn format_cluster(
        &self,
        server: &str,
        port: u16,
        stamp: NaiveDateTime,
        zone: &str,
        format: BackupFormat,
    ) -> String {
        format!(
            "{}ht_{}{}_cluster_{}_{}.{}",
            self.prefix,
            server,
            port,
            stamp.format(STAMP_FORMAT),
            zone,
            format.extension()
        )
    }
}
