/// Backup trimming
///
/// Runs a retention pass over a backup directory listing: partitions the
/// files, selects target databases, evaluates the policy and executes the
/// resulting deletions. Failures on individual files are collected as
/// warnings and never stop the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::config::Settings;
use super::diff::{diff, CatalogDiff};
use super::error::{CatalogError, SelectionError};
use super::inventory::{BackupFile, Inventory};
use super::retention::{prune_cluster, prune_database, PruneResult};
use super::selector::select;

/// Removes a single backup file.
#[cfg_attr(test, mockall::automock)]
pub trait Remover {
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Deletes from the local filesystem
#[derive(Debug, Default)]
pub struct FsRemover;

impl Remover for FsRemover {
    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Logs what would be deleted and leaves the file alone
#[derive(Debug, Default)]
pub struct DryRunRemover;

impl Remover for DryRunRemover {
    fn remove(&self, path: &Path) -> io::Result<()> {
        info!(path = %path.display(), "Would delete (dry run)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrimWarning {
    /// Filename carries the prefix but not the naming convention.
    Unparseable { path: PathBuf },
    /// File was marked for deletion and is still on disk.
    DeletionFailed { path: PathBuf, error: String },
    /// Explicitly requested database has no backups in the directory.
    NoBackups { database: String },
    /// Selection came back empty.
    NoTargets,
    /// Catalog cross-check could not run.
    CatalogUnavailable { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseTrim {
    pub database: String,
    pub result: PruneResult,
}

/// Everything a trim run decided and did
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrimReport {
    pub dry_run: bool,
    pub databases: Vec<DatabaseTrim>,
    pub cluster: Option<PruneResult>,
    pub skipped: Vec<BackupFile>,
    pub warnings: Vec<TrimWarning>,
    pub catalog_diff: Option<CatalogDiff>,
    /// Files actually removed (or that would be, on a dry run).
    pub removed: usize,
    pub freed_bytes: u64,
}

impl TrimReport {
    pub fn failed_deletions(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, TrimWarning::DeletionFailed { .. }))
            .count()
    }

    fn record_skipped(&mut self, skipped: Vec<BackupFile>) {
        for file in &skipped {
            self.warnings.push(TrimWarning::Unparseable { path: file.path.clone() });
        }
        self.skipped.extend(skipped);
    }
}

pub struct Trimmer<'a> {
    settings: &'a Settings,
    remover: Box<dyn Remover + 'a>,
    dry_run: bool,
}

impl<'a> Trimmer<'a> {
    /// Trimmer that deletes for real.
    pub fn new(settings: &'a Settings) -> Self {
        Self::with_remover(settings, Box::new(FsRemover))
    }

    /// Trimmer that only reports.
    pub fn dry_run(settings: &'a Settings) -> Self {
        Self {
            settings,
            remover: Box::new(DryRunRemover),
            dry_run: true,
        }
    }

    pub fn with_remover(settings: &'a Settings, remover: Box<dyn Remover + 'a>) -> Self {
        Self {
            settings,
            remover,
            dry_run: false,
        }
    }

    /// Per-database trim of `files`.
    ///
    /// Targets come from the databases found in the filenames, so a name
    /// that is no longer in the catalog can still be trimmed. When a
    /// `catalog` is given its databases are compared with the backed up
    /// ones and the result attached to the report.
    pub fn trim_databases(
        &self,
        files: Vec<BackupFile>,
        catalog: Option<&dyn Catalog>,
        now: DateTime<Utc>,
    ) -> Result<TrimReport, SelectionError> {
        let mut report = self.empty_report();
        let mut inventory = Inventory::partition(files, &self.settings.codec);
        if inventory.is_empty() {
            warn!(prefix = %self.settings.codec.prefix(), "No backup files found");
        }
        report.record_skipped(std::mem::take(&mut inventory.skipped));

        let targets = select(&inventory.universe(), &self.settings.criteria)?;

        for name in &self.settings.criteria.include_names {
            if !inventory.by_database.contains_key(name) {
                warn!(database = %name, "No backups found for requested database");
                report.warnings.push(TrimWarning::NoBackups { database: name.clone() });
            }
        }

        if targets.is_empty() {
            warn!("No databases selected for trimming");
            report.warnings.push(TrimWarning::NoTargets);
        }

        if let Some(catalog) = catalog {
            match compare_with_catalog(catalog, self.settings, &inventory.backed_up_names()) {
                Ok(diff) => report.catalog_diff = Some(diff),
                Err(e) => {
                    warn!(error = %e, "Catalog cross-check skipped");
                    report.warnings.push(TrimWarning::CatalogUnavailable { error: e.to_string() });
                }
            }
        }

        for database in targets {
            let files = inventory.by_database.shift_remove(&database).unwrap_or_default();
            info!(database = %database, backups = files.len(), "Trimming database backups");

            let result = prune_database(files, &self.settings.policy, now);
            self.execute(&result, &mut report);
            report.databases.push(DatabaseTrim { database, result });
        }

        self.log_summary(&report);
        Ok(report)
    }

    /// Whole-cluster trim of `files`; per-database backups are left alone.
    pub fn trim_cluster(&self, files: Vec<BackupFile>, now: DateTime<Utc>) -> TrimReport {
        let mut report = self.empty_report();
        let mut inventory = Inventory::partition(files, &self.settings.codec);
        if inventory.is_empty() {
            warn!(prefix = %self.settings.codec.prefix(), "No backup files found");
        }
        report.record_skipped(std::mem::take(&mut inventory.skipped));

        if inventory.clusters.is_empty() {
            warn!("No cluster backups found");
            report.warnings.push(TrimWarning::NoTargets);
        }

        info!(backups = inventory.clusters.len(), "Trimming cluster backups");
        let result = prune_cluster(inventory.clusters, &self.settings.policy, now);
        self.execute(&result, &mut report);
        report.cluster = Some(result);

        self.log_summary(&report);
        report
    }

    fn empty_report(&self) -> TrimReport {
        TrimReport {
            dry_run: self.dry_run,
            ..Default::default()
        }
    }

    fn execute(&self, result: &PruneResult, report: &mut TrimReport) {
        for deletion in &result.deleted {
            let file = &deletion.file;
            match self.remover.remove(&file.path) {
                Ok(()) => {
                    debug!(path = %file.path.display(), reason = ?deletion.reason, "Deleted backup");
                    report.removed += 1;
                    report.freed_bytes = report.freed_bytes.saturating_add(file.size);
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "Failed to delete backup");
                    report.warnings.push(TrimWarning::DeletionFailed {
                        path: file.path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn log_summary(&self, report: &TrimReport) {
        info!(
            removed = report.removed,
            freed_bytes = report.freed_bytes,
            failed = report.failed_deletions(),
            skipped = report.skipped.len(),
            dry_run = report.dry_run,
            "Trim finished"
        );
    }
}

/// Cross-check the live catalog against the databases that have backups.
///
/// Names excluded by the selection criteria or by the catalog filter are
/// left out on both sides.
pub fn compare_with_catalog(
    catalog: &dyn Catalog,
    settings: &Settings,
    backed_up: &BTreeSet<String>,
) -> Result<CatalogDiff, CatalogError> {
    let records = settings.catalog_filter.apply(catalog.list()?);
    let criteria = &settings.criteria;

    let catalog_names: BTreeSet<String> = records
        .into_iter()
        .map(|r| r.name)
        .filter(|name| !criteria.is_excluded(name))
        .collect();
    let backed_up: BTreeSet<String> = backed_up
        .iter()
        .filter(|name| !criteria.is_excluded(name))
        .cloned()
        .collect();

    let result = diff(&catalog_names, &backed_up);
    for name in &result.missing_backups {
        warn!(database = %name, "Database has no backups");
    }
    for name in &result.orphan_backups {
        warn!(database = %name, "Backups found for a database that no longer exists");
    }

    Ok(result)
}
