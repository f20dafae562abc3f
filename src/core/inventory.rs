/// Backup directory inventory
///
/// Turns a directory tree into `BackupFile` records and groups them by the
/// database encoded in their filename.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::naming::NamingCodec;
use super::selector::Universe;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    pub path: PathBuf,
    /// Database identifier recovered from the filename, if any.
    pub database: Option<String>,
    /// Last modification time.
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

impl BackupFile {
    pub fn new(path: impl Into<PathBuf>, timestamp: DateTime<Utc>, size: u64) -> Self {
        Self {
            path: path.into(),
            database: None,
            timestamp,
            size,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()?.to_str()
    }
}

/// List every regular file under `dir`, recursively, oldest first.
///
/// Symlinks are followed. Entries that vanish, dangle or cannot be read
/// mid-walk are logged and left out; only an unreadable root is an error.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e).with_context(|| format!("Failed to read backup directory {}", dir.display()));
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to stat backup file");
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "No modification time available");
                continue;
            }
        };

        files.push(BackupFile::new(entry.into_path(), DateTime::<Utc>::from(modified), metadata.len()));
    }

    files.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
    debug!(dir = %dir.display(), count = files.len(), "Listed backup directory");

    Ok(files)
}

/// A listing split by what the filenames say
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Per-database backups, keyed in order of first appearance.
    pub by_database: IndexMap<String, Vec<BackupFile>>,
    /// Whole-instance backups.
    pub clusters: Vec<BackupFile>,
    /// Files carrying the configured prefix that do not fit the grammar.
    pub skipped: Vec<BackupFile>,
}

impl Inventory {
    /// Split `files` using `codec`. Files outside the codec's prefix are
    /// ignored entirely.
    pub fn partition(files: Vec<BackupFile>, codec: &NamingCodec) -> Self {
        let mut inventory = Self::default();

        for file in files {
            if !file.path.file_name().is_some_and(|name| codec.has_prefix(name)) {
                continue;
            }

            let Some(name) = file.file_name() else {
                warn!(path = %file.path.display(), "Skipping file with non UTF-8 name");
                inventory.skipped.push(file);
                continue;
            };

            match codec.parse(name) {
                Some(parsed) => match parsed.database() {
                    Some(database) => {
                        let database = database.to_string();
                        inventory
                            .by_database
                            .entry(database.clone())
                            .or_default()
                            .push(file.with_database(database));
                    }
                    None => inventory.clusters.push(file),
                },
                None => {
                    warn!(path = %file.path.display(), "Filename does not follow the backup naming convention, skipping");
                    inventory.skipped.push(file);
                }
            }
        }

        inventory
    }

    /// Databases with at least one backup, as a selection universe.
    pub fn universe(&self) -> Universe {
        Universe::FileDerived(self.by_database.keys().cloned().collect())
    }

    pub fn backed_up_names(&self) -> BTreeSet<String> {
        self.by_database.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_database.is_empty() && self.clusters.is_empty() && self.skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 3, 0, 0).unwrap()
    }

    fn file(name: &str, day: u32) -> BackupFile {
        BackupFile::new(PathBuf::from("/backups").join(name), at(day), 10)
    }

    #[test]
    fn test_partition_groups_by_database() {
        let files = vec![
            file("db_crm_20240501_030000_UTC.dump", 1),
            file("db_billing_20240502_030000_UTC.dump", 2),
            file("db_crm_20240503_030000_UTC.dump", 3),
            file("ht_localhost5432_cluster_20240503_030000_UTC.dump", 3),
            file("db_crm_broken.dump", 4),
            file("notes.txt", 4),
        ];

        let inventory = Inventory::partition(files, &NamingCodec::new(""));

        let keys: Vec<&String> = inventory.by_database.keys().collect();
        assert_eq!(keys, vec!["crm", "billing"]);
        assert_eq!(inventory.by_database["crm"].len(), 2);
        assert!(inventory.by_database["crm"]
            .iter()
            .all(|f| f.database.as_deref() == Some("crm")));
        assert_eq!(inventory.clusters.len(), 1);

        let skipped: Vec<&str> = inventory.skipped.iter().filter_map(|f| f.file_name()).collect();
        assert_eq!(skipped, vec!["db_crm_broken.dump", "notes.txt"]);
    }

    #[test]
    fn test_partition_ignores_foreign_prefix() {
        let files = vec![
            file("prod_db_crm_20240501_030000_UTC.dump", 1),
            file("test_db_crm_20240501_030000_UTC.dump", 1),
        ];

        let inventory = Inventory::partition(files, &NamingCodec::new("prod_"));
        assert_eq!(inventory.by_database["crm"].len(), 1);
        assert!(inventory.skipped.is_empty());
    }

    #[test]
    fn test_universe_is_file_derived() {
        let files = vec![file("db_crm_20240501_030000_UTC.dump", 1)];
        let inventory = Inventory::partition(files, &NamingCodec::new(""));

        let universe = inventory.universe();
        assert!(universe.is_file_derived());
        assert_eq!(universe.names(), vec!["crm"]);
    }

    #[test]
    fn test_list_backups_walks_subdirectories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("2024")).unwrap();
        fs::write(dir.path().join("db_a_20240501_030000_UTC.dump"), b"aaaa").unwrap();
        fs::write(dir.path().join("2024").join("db_b_20240501_030000_UTC.dump"), b"bb").unwrap();

        let files = list_backups(dir.path()).unwrap();
        assert_eq!(files.len(), 2);

        let mut sizes: Vec<u64> = files.iter().map(|f| f.size).collect();
        sizes.sort();
        assert_eq!(sizes, vec![2, 4]);
        assert!(files.iter().all(|f| f.database.is_none()));
    }

    #[cfg(unix)]
    #[test]
    fn test_partition_ignores_foreign_non_utf8_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let foreign = PathBuf::from("/backups").join(OsStr::from_bytes(b"other_\xff.txt"));
        let ours = PathBuf::from("/backups").join(OsStr::from_bytes(b"prod_\xff.dump"));
        let files = vec![
            BackupFile::new(foreign, at(1), 10),
            BackupFile::new(ours.clone(), at(1), 10),
            file("prod_db_crm_20240501_030000_UTC.dump", 1),
        ];

        let inventory = Inventory::partition(files, &NamingCodec::new("prod_"));
        assert_eq!(inventory.by_database["crm"].len(), 1);
        assert_eq!(inventory.skipped.len(), 1);
        assert_eq!(inventory.skipped[0].path, ours);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_backups_skips_unreadable_entries() {
        use std::os::unix::fs::{symlink, PermissionsExt};

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("db_a_20240501_030000_UTC.dump"), b"aaaa").unwrap();
        symlink(
            dir.path().join("vanished.dump"),
            dir.path().join("db_b_20240501_030000_UTC.dump"),
        )
        .unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let listed = list_backups(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let files = listed.unwrap();
        let names: Vec<&str> = files.iter().filter_map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["db_a_20240501_030000_UTC.dump"]);
    }

    #[test]
    fn test_empty_inventory() {
        let inventory = Inventory::partition(vec![file("notes.txt", 1)], &NamingCodec::new("prod_"));
        assert!(inventory.is_empty());
        assert!(!Inventory::partition(vec![file("notes.txt", 1)], &NamingCodec::new("")).is_empty());
    }

    #[test]
    fn test_list_backups_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list_backups(&dir.path().join("nope")).is_err());
    }
}
