/// Catalog versus backup directory cross-check
///
/// Reporting only: databases with no backup at all, and backups of
/// databases that no longer exist.

use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogDiff {
    /// In the catalog, no backup found.
    pub missing_backups: BTreeSet<String>,
    /// Backed up, no longer in the catalog.
    pub orphan_backups: BTreeSet<String>,
}

impl CatalogDiff {
    pub fn is_clean(&self) -> bool {
        self.missing_backups.is_empty() && self.orphan_backups.is_empty()
    }
}

pub fn diff(catalog_names: &BTreeSet<String>, backed_up_names: &BTreeSet<String>) -> CatalogDiff {
    CatalogDiff {
        missing_backups: catalog_names.difference(backed_up_names).cloned().collect(),
        orphan_backups: backed_up_names.difference(catalog_names).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_diff() {
        let result = diff(&set(&["billing", "crm", "hr"]), &set(&["crm", "legacy"]));

        assert_eq!(result.missing_backups, set(&["billing", "hr"]));
        assert_eq!(result.orphan_backups, set(&["legacy"]));
        assert!(!result.is_clean());
    }

    #[test]
    fn test_diff_identical_sets_is_clean() {
        let names = set(&["crm"]);
        assert!(diff(&names, &names).is_clean());
        assert!(diff(&BTreeSet::new(), &BTreeSet::new()).is_clean());
    }
}
