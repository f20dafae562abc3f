/// Target selection
///
/// Narrows a universe of database names down to the ordered list an
/// operation should act on. Exclusion always wins over inclusion.

use anyhow::Context;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::catalog::{Catalog, CatalogFilter, DatabaseRecord};
use super::error::{ConfigError, SelectionError};

/// Where the candidate names come from
#[derive(Debug, Clone)]
pub enum Universe {
    /// Live catalog; every explicitly included name must exist here.
    Catalog(Vec<DatabaseRecord>),
    /// Names recovered from backup filenames; databases may be long gone
    /// from the instance, so unknown include names are simply not matched.
    FileDerived(Vec<String>),
}

impl Universe {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Universe::Catalog(records) => records.iter().map(|r| r.name.as_str()).collect(),
            Universe::FileDerived(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_file_derived(&self) -> bool {
        matches!(self, Universe::FileDerived(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub include_names: Vec<String>,
    pub include_regex: Option<Regex>,
    /// Order the result by `include_names` instead of universe order.
    pub include_priority: bool,
    pub exclude_names: Vec<String>,
    pub exclude_regex: Option<Regex>,
}

impl SelectionCriteria {
    /// Compile a user supplied pattern, anchored at the start of the name.
    /// An empty pattern means "no pattern".
    pub fn compile_pattern(field: &'static str, pattern: &str) -> Result<Option<Regex>, ConfigError> {
        if pattern.is_empty() {
            return Ok(None);
        }

        Regex::new(&format!("^(?:{})", pattern))
            .map(Some)
            .map_err(|source| ConfigError::InvalidRegex {
                field,
                pattern: pattern.to_string(),
                source,
            })
    }

    /// A compiled pattern as the user wrote it, without the added anchor.
    pub fn pattern_source(re: &Regex) -> &str {
        re.as_str()
            .strip_prefix("^(?:")
            .and_then(|p| p.strip_suffix(')'))
            .unwrap_or(re.as_str())
    }

    fn selects_everything(&self) -> bool {
        self.include_names.is_empty() && self.include_regex.is_none()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude_names.iter().any(|n| n == name)
            || self.exclude_regex.as_ref().is_some_and(|re| re.is_match(name))
    }

    fn matches_include_regex(&self, name: &str) -> bool {
        self.include_regex.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// Select the target databases of an operation.
///
/// Returns an empty list when nothing matches; the caller decides whether
/// that is worth a warning.
pub fn select(universe: &Universe, criteria: &SelectionCriteria) -> Result<Vec<String>, SelectionError> {
    let names = universe.names();

    let mut include: Vec<&str> = Vec::with_capacity(criteria.include_names.len());
    for name in &criteria.include_names {
        if !include.contains(&name.as_str()) {
            include.push(name);
        }
    }

    if !universe.is_file_derived() {
        let present: HashSet<&str> = names.iter().copied().collect();
        let missing: Vec<String> = include
            .iter()
            .filter(|name| !present.contains(*name))
            .map(|name| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(SelectionError::UnknownDatabases(missing));
        }
    }

    let candidates: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| {
            criteria.selects_everything()
                || include.contains(name)
                || criteria.matches_include_regex(name)
        })
        .filter(|name| !criteria.is_excluded(name))
        .collect();

    let targets: Vec<String> = if criteria.include_priority {
        include
            .iter()
            .filter(|name| candidates.contains(*name))
            .chain(candidates.iter().filter(|name| !include.contains(*name)))
            .map(|name| name.to_string())
            .collect()
    } else {
        candidates.iter().map(|name| name.to_string()).collect()
    };

    debug!(
        universe = names.len(),
        selected = targets.len(),
        file_derived = universe.is_file_derived(),
        "Target selection complete"
    );

    Ok(targets)
}

/// Select targets from the live catalog, after `filter`.
///
/// Records come back in selection order. Targets that do not accept
/// connections stay in the result and are logged.
pub fn select_from_catalog(
    catalog: &dyn Catalog,
    filter: &CatalogFilter,
    criteria: &SelectionCriteria,
) -> anyhow::Result<Vec<DatabaseRecord>> {
    let records = filter.apply(catalog.list().context("Failed to read the database catalog")?);
    let targets = select(&Universe::Catalog(records.clone()), criteria)?;

    let mut selected = Vec::with_capacity(targets.len());
    for name in &targets {
        let Some(record) = records.iter().find(|r| &r.name == name) else {
            continue;
        };
        if !record.connectable {
            warn!(database = %record.name, "Database does not accept connections");
        }
        selected.push(record.clone());
    }

    Ok(selected)
}


#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    const NAMES: &[&str] = &["crm", "billing", "hr", "sales_eu", "sales_us", "tmp_load", "postgres", "archive"];

    fn subset() -> impl Strategy<Value = Vec<String>> {
        prop::sample::subsequence(NAMES, 0..=NAMES.len())
            .prop_map(|names| names.into_iter().map(str::to_string).collect())
    }

    fn prefix_pattern() -> impl Strategy<Value = Option<Regex>> {
        prop::option::of(prop::sample::select(vec!["sales_", "tmp_", "c", "h", ".*"]))
            .prop_map(|p| p.and_then(|p| SelectionCriteria::compile_pattern("pattern", p).ok().flatten()))
    }

    fn arb_criteria() -> impl Strategy<Value = SelectionCriteria> {
        (subset(), prefix_pattern(), any::<bool>(), subset(), prefix_pattern()).prop_map(
            |(include_names, include_regex, include_priority, exclude_names, exclude_regex)| SelectionCriteria {
                include_names,
                include_regex,
                include_priority,
                exclude_names,
                exclude_regex,
            },
        )
    }

    proptest! {
        #[test]
        fn excluded_names_are_never_selected(universe in subset(), criteria in arb_criteria()) {
            let result = select(&Universe::FileDerived(universe.clone()), &criteria).unwrap();

            for name in &result {
                prop_assert!(!criteria.exclude_names.contains(name));
                prop_assert!(!criteria.exclude_regex.as_ref().is_some_and(|re| re.is_match(name)));
                prop_assert!(universe.contains(name));
            }
        }

        #[test]
        fn catalog_selection_is_a_subset_without_duplicates(universe in subset(), criteria in arb_criteria()) {
            let catalog = Universe::Catalog(universe.iter().map(|n| DatabaseRecord::new(n.as_str(), "app")).collect());

            if let Ok(result) = select(&catalog, &criteria) {
                let unique: HashSet<&String> = result.iter().collect();
                prop_assert_eq!(unique.len(), result.len());
                prop_assert!(result.iter().all(|name| universe.contains(name) && !criteria.is_excluded(name)));
            }
        }
    }
}
