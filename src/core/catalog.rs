/// Live database catalog lookup
///
/// The catalog is read through the `psql` client rather than a wire-level
/// driver, the same way the rest of the tool shells out to system commands.

use serde::Serialize;
use std::process::Command;
use tracing::debug;

use super::error::CatalogError;

/// Field separator passed to `psql -F`; cannot appear in an identifier.
const FIELD_SEP: char = '\u{1f}';

/// Databases in OID order, which is the order they were created in.
const LIST_DATABASES_QUERY: &str = "SELECT d.datname, pg_catalog.pg_get_userbyid(d.datdba), \
     d.datallowconn, d.datistemplate \
     FROM pg_catalog.pg_database d ORDER BY d.oid";

/// One row of `pg_database`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseRecord {
    pub name: String,
    pub owner: String,
    pub connectable: bool,
    pub is_template: bool,
}

impl DatabaseRecord {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            connectable: true,
            is_template: false,
        }
    }
}

/// Source of the database universe for a run.
#[cfg_attr(test, mockall::automock)]
pub trait Catalog {
    /// All databases of the instance, in catalog order.
    fn list(&self) -> Result<Vec<DatabaseRecord>, CatalogError>;
}

/// Catalog backed by the `psql` command line client
#[derive(Debug, Clone)]
pub struct PsqlCatalog {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl PsqlCatalog {
    pub fn new(host: impl Into<String>, user: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port,
        }
    }
}

impl Catalog for PsqlCatalog {
    fn list(&self) -> Result<Vec<DatabaseRecord>, CatalogError> {
        debug!(host = %self.host, user = %self.user, port = self.port, "Querying pg_database");

        let output = Command::new("psql")
            .args(["-X", "-A", "-t", "-w"])
            .args(["-h", &self.host])
            .args(["-U", &self.user])
            .args(["-p", &self.port.to_string()])
            .args(["-d", "postgres"])
            .arg("-F")
            .arg(FIELD_SEP.to_string())
            .args(["-c", LIST_DATABASES_QUERY])
            .output()?;

        if !output.status.success() {
            return Err(CatalogError::QueryFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_catalog_rows(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse unaligned, tuples-only `psql` output of `LIST_DATABASES_QUERY`.
pub fn parse_catalog_rows(stdout: &str) -> Result<Vec<DatabaseRecord>, CatalogError> {
    let mut records = Vec::new();

    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(FIELD_SEP).collect();
        let [name, owner, allow_conn, template] = fields.as_slice() else {
            return Err(CatalogError::MalformedRow { line: line.to_string() });
        };

        records.push(DatabaseRecord {
            name: name.to_string(),
            owner: owner.to_string(),
            connectable: parse_pg_bool(allow_conn, line)?,
            is_template: parse_pg_bool(template, line)?,
        });
    }

    Ok(records)
}

fn parse_pg_bool(value: &str, line: &str) -> Result<bool, CatalogError> {
    match value.trim() {
        "t" | "true" => Ok(true),
        "f" | "false" => Ok(false),
        _ => Err(CatalogError::MalformedRow { line: line.to_string() }),
    }
}

/// Pre-filter applied to catalog records before target selection.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Drop databases flagged as templates (`template0`, `template1`, ...).
    pub exclude_templates: bool,
    /// Keep only databases owned by this role.
    pub owner: Option<String>,
}

impl CatalogFilter {
    pub fn apply(&self, records: Vec<DatabaseRecord>) -> Vec<DatabaseRecord> {
        records
            .into_iter()
            .filter(|r| !(self.exclude_templates && r.is_template))
            .filter(|r| self.owner.as_deref().map_or(true, |owner| r.owner == owner))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> String {
        fields.join(FIELD_SEP.to_string().as_str())
    }

    #[test]
    fn test_parse_catalog_rows() {
        let stdout = format!(
            "{}\n{}\n\n{}\n",
            row(&["template1", "postgres", "t", "t"]),
            row(&["billing", "app", "t", "f"]),
            row(&["archive", "app", "f", "f"]),
        );

        let records = parse_catalog_rows(&stdout).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "template1");
        assert!(records[0].is_template);
        assert_eq!(records[1].owner, "app");
        assert!(records[1].connectable);
        assert!(!records[2].connectable);
    }

    #[test]
    fn test_parse_catalog_rows_rejects_short_row() {
        let err = parse_catalog_rows("billing\n").unwrap_err();
        assert!(matches!(err, CatalogError::MalformedRow { .. }));
    }

    #[test]
    fn test_parse_catalog_rows_rejects_bad_bool() {
        let stdout = row(&["billing", "app", "yes", "f"]);
        assert!(parse_catalog_rows(&stdout).is_err());
    }

    #[test]
    fn test_catalog_filter() {
        let mut template = DatabaseRecord::new("template1", "postgres");
        template.is_template = true;
        let records = vec![
            template,
            DatabaseRecord::new("billing", "app"),
            DatabaseRecord::new("reports", "analyst"),
        ];

        let filter = CatalogFilter {
            exclude_templates: true,
            owner: Some("app".to_string()),
        };
        let names: Vec<String> = filter.apply(records.clone()).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["billing"]);

        let everything = CatalogFilter::default().apply(records);
        assert_eq!(everything.len(), 3);
    }
}
