/// Retention policy evaluation
///
/// Decides which backups of one database (or of the whole cluster) may be
/// removed. Nothing here touches the filesystem; the caller executes the
/// returned deletion set.
///
/// Evaluation order:
/// 1. newest `min_keep` backups are protected, whatever their age or size
/// 2. remaining backups older than `expiry_days` are deleted
/// 3. what is left is kept newest-first while the running total (protected
///    sizes included) fits in `max_total_size`; the first backup that does
///    not fit and everything older goes

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::inventory::BackupFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RetentionPolicy {
    /// Most recent backups that are never deleted.
    pub min_keep: usize,
    /// Age limit in whole days; 0 disables the age rule.
    pub expiry_days: u32,
    /// Byte budget for all retained backups; 0 disables the size rule.
    pub max_total_size: u64,
}

impl RetentionPolicy {
    pub fn is_noop(&self) -> bool {
        self.expiry_days == 0 && self.max_total_size == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PruneOutcome {
    Applied,
    /// Every threshold is disabled; nothing can be deleted.
    PolicyNoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DeletionReason {
    Expired { age_days: i64 },
    OverBudget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deletion {
    pub file: BackupFile,
    pub reason: DeletionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneResult {
    /// Retained backups, newest first.
    pub kept: Vec<BackupFile>,
    /// Backups to remove, newest first.
    pub deleted: Vec<Deletion>,
    /// Backups whose database could not be identified; never deleted.
    pub skipped: Vec<BackupFile>,
    pub outcome: PruneOutcome,
}

impl PruneResult {
    pub fn deleted_files(&self) -> impl Iterator<Item = &BackupFile> {
        self.deleted.iter().map(|d| &d.file)
    }

    pub fn deleted_bytes(&self) -> u64 {
        self.deleted_files().map(|f| f.size).sum()
    }

    pub fn kept_bytes(&self) -> u64 {
        self.kept.iter().map(|f| f.size).sum()
    }
}

/// Apply `policy` to the backups of a single database.
///
/// Files without a database identifier are returned in `skipped` and take
/// no part in ranking or deletion.
pub fn prune_database(files: Vec<BackupFile>, policy: &RetentionPolicy, now: DateTime<Utc>) -> PruneResult {
    let (identified, skipped): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| f.database.is_some());

    let mut result = apply_policy(identified, policy, now);
    result.skipped = skipped;
    result
}

/// Apply `policy` to a chronological series of whole-cluster backups.
pub fn prune_cluster(files: Vec<BackupFile>, policy: &RetentionPolicy, now: DateTime<Utc>) -> PruneResult {
    apply_policy(files, policy, now)
}

fn apply_policy(mut files: Vec<BackupFile>, policy: &RetentionPolicy, now: DateTime<Utc>) -> PruneResult {
    // Newest first; path breaks ties so reruns rank identically.
    files.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.path.cmp(&b.path)));

    if policy.is_noop() {
        return PruneResult {
            kept: files,
            deleted: Vec::new(),
            skipped: Vec::new(),
            outcome: PruneOutcome::PolicyNoop,
        };
    }

    let surplus = files.split_off(policy.min_keep.min(files.len()));
    let mut kept = files;
    let mut deleted = Vec::new();

    let mut retained_bytes: u64 = kept.iter().map(|f| f.size).fold(0, u64::saturating_add);
    let mut over_budget = false;

    for file in surplus {
        let age_days = (now - file.timestamp).num_days();
        if policy.expiry_days > 0 && age_days > i64::from(policy.expiry_days) {
            deleted.push(Deletion {
                file,
                reason: DeletionReason::Expired { age_days },
            });
            continue;
        }

        if policy.max_total_size > 0 {
            let total = retained_bytes.saturating_add(file.size);
            if over_budget || total > policy.max_total_size {
                over_budget = true;
                deleted.push(Deletion {
                    file,
                    reason: DeletionReason::OverBudget,
                });
                continue;
            }
            retained_bytes = total;
        }

        kept.push(file);
    }

    debug!(
        kept = kept.len(),
        deleted = deleted.len(),
        retained_bytes,
        "Retention policy applied"
    );

    PruneResult {
        kept,
        deleted,
        skipped: Vec::new(),
        outcome: PruneOutcome::Applied,
    }
}
