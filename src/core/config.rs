/// Settings resolution
///
/// Every value is resolved once, before anything runs, with a fixed
/// precedence: command line flag, then config file, then built-in default.
/// The result is immutable and handed to the engine by reference.

use std::path::{Path, PathBuf};

use super::catalog::{CatalogFilter, PsqlCatalog};
use super::error::ConfigError;
use super::naming::NamingCodec;
use super::retention::RetentionPolicy;
use super::selector::SelectionCriteria;
use crate::utils::app_config::{AppConfig, SizeSetting};
use crate::utils::constants::*;
use crate::utils::helpers::{format_bytes, parse_size};

/// Values given on the command line; `None` / empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub backup_dir: Option<PathBuf>,
    pub prefix: Option<String>,
    /// Replaces the config file's whole include/exclude block.
    pub db_names: Vec<String>,
    pub exclude_templates: Option<bool>,
    pub db_owner: Option<String>,
    pub min_backups: Option<usize>,
    pub expiry_days: Option<u32>,
    pub max_size: Option<String>,
    pub pg_warnings: Option<bool>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl ConnectionSettings {
    pub fn catalog(&self) -> PsqlCatalog {
        PsqlCatalog::new(self.host.clone(), self.user.clone(), self.port)
    }
}

/// Fully resolved and validated settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub backup_dir: Option<PathBuf>,
    pub codec: NamingCodec,
    pub criteria: SelectionCriteria,
    pub catalog_filter: CatalogFilter,
    pub policy: RetentionPolicy,
    pub pg_warnings: bool,
    pub log_level: String,
}

impl Settings {
    pub fn resolve(file: &AppConfig, flags: &Overrides) -> Result<Self, ConfigError> {
        let trim = &file.trim;

        let connection = ConnectionSettings {
            host: flags
                .host
                .clone()
                .or_else(|| file.connection.host.clone())
                .unwrap_or_else(|| DEFAULT_PG_HOST.to_string()),
            user: flags
                .user
                .clone()
                .or_else(|| file.connection.user.clone())
                .unwrap_or_else(|| DEFAULT_PG_USER.to_string()),
            port: flags.port.or(file.connection.port).unwrap_or(DEFAULT_PG_PORT),
        };

        let include_priority = trim.include_priority.unwrap_or(false);
        let criteria = if flags.db_names.is_empty() {
            SelectionCriteria {
                include_names: trim.include_dbs.clone().unwrap_or_default(),
                include_regex: SelectionCriteria::compile_pattern(
                    "include_regex",
                    trim.include_regex.as_deref().unwrap_or_default(),
                )?,
                include_priority,
                exclude_names: trim
                    .exclude_dbs
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EXCLUDED_DBS.iter().map(|s| s.to_string()).collect()),
                exclude_regex: SelectionCriteria::compile_pattern(
                    "exclude_regex",
                    trim.exclude_regex.as_deref().unwrap_or_default(),
                )?,
            }
        } else {
            SelectionCriteria {
                include_names: flags.db_names.clone(),
                include_priority,
                ..Default::default()
            }
        };

        let max_total_size = match (&flags.max_size, &trim.max_size) {
            (Some(text), _) => parse_size(text)?,
            (None, Some(SizeSetting::Bytes(bytes))) => *bytes,
            (None, Some(SizeSetting::Text(text))) => parse_size(text)?,
            (None, None) => parse_size(DEFAULT_MAX_SIZE)?,
        };

        let policy = RetentionPolicy {
            min_keep: flags.min_backups.or(trim.min_backups).unwrap_or(DEFAULT_MIN_BACKUPS),
            expiry_days: flags.expiry_days.or(trim.expiry_days).unwrap_or(DEFAULT_EXPIRY_DAYS),
            max_total_size,
        };

        let catalog_filter = CatalogFilter {
            exclude_templates: flags
                .exclude_templates
                .or(trim.exclude_templates)
                .unwrap_or(DEFAULT_EXCLUDE_TEMPLATES),
            owner: flags.db_owner.clone().or_else(|| trim.db_owner.clone()),
        };

        Ok(Self {
            connection,
            backup_dir: flags.backup_dir.clone().or_else(|| trim.backup_dir.clone()),
            codec: NamingCodec::new(flags.prefix.clone().or_else(|| trim.prefix.clone()).unwrap_or_default()),
            criteria,
            catalog_filter,
            policy,
            pg_warnings: flags.pg_warnings.or(trim.pg_warnings).unwrap_or(false),
            log_level: flags
                .log_level
                .clone()
                .or_else(|| file.logging.level.clone())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    /// Backup directory, required by every directory-based command.
    pub fn require_backup_dir(&self) -> Result<&Path, ConfigError> {
        self.backup_dir.as_deref().ok_or(ConfigError::MissingBackupPath)
    }

    /// Key/value rows for `config show`
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let list = |names: &[String]| if names.is_empty() { "-".to_string() } else { names.join(", ") };
        let pattern = |re: &Option<regex::Regex>| {
            re.as_ref()
                .map_or("-".to_string(), |re| SelectionCriteria::pattern_source(re).to_string())
        };
        let disabled_or = |value: String, zero: bool| if zero { "disabled".to_string() } else { value };

        vec![
            ("host", self.connection.host.clone()),
            ("user", self.connection.user.clone()),
            ("port", self.connection.port.to_string()),
            (
                "backup_dir",
                self.backup_dir
                    .as_ref()
                    .map_or("-".to_string(), |p| p.display().to_string()),
            ),
            ("prefix", self.codec.prefix().to_string()),
            ("naming_scheme", self.codec.scheme().to_string()),
            ("include_dbs", list(&self.criteria.include_names)),
            ("include_regex", pattern(&self.criteria.include_regex)),
            ("include_priority", self.criteria.include_priority.to_string()),
            ("exclude_dbs", list(&self.criteria.exclude_names)),
            ("exclude_regex", pattern(&self.criteria.exclude_regex)),
            ("exclude_templates", self.catalog_filter.exclude_templates.to_string()),
            ("db_owner", self.catalog_filter.owner.clone().unwrap_or_else(|| "-".to_string())),
            ("min_backups", self.policy.min_keep.to_string()),
            (
                "expiry_days",
                disabled_or(self.policy.expiry_days.to_string(), self.policy.expiry_days == 0),
            ),
            (
                "max_size",
                disabled_or(format_bytes(self.policy.max_total_size), self.policy.max_total_size == 0),
            ),
            ("pg_warnings", self.pg_warnings.to_string()),
            ("log_level", self.log_level.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn file_config(toml_text: &str) -> AppConfig {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&AppConfig::default(), &Overrides::default()).unwrap();

        assert_eq!(settings.connection.host, "localhost");
        assert_eq!(settings.connection.port, 5432);
        assert_eq!(settings.policy.min_keep, 1);
        assert_eq!(settings.policy.expiry_days, 365);
        assert_eq!(settings.policy.max_total_size, 10_000 * MB);
        assert_eq!(settings.criteria.exclude_names, vec!["postgres".to_string()]);
        assert!(settings.catalog_filter.exclude_templates);
        assert!(!settings.pg_warnings);
        assert_eq!(settings.log_level, "info");
        assert!(settings.require_backup_dir().is_err());
    }

    #[test]
    fn test_flag_beats_file_beats_default() {
        let file = file_config(
            r#"
            [connection]
            host = "db01"
            user = "backup"

            [trim]
            backup_dir = "/srv/backups"
            min_backups = 4
            expiry_days = 30
            max_size = 0
            "#,
        );
        let flags = Overrides {
            host: Some("db02".to_string()),
            expiry_days: Some(0),
            max_size: Some("100MB".to_string()),
            ..Default::default()
        };

        let settings = Settings::resolve(&file, &flags).unwrap();

        assert_eq!(settings.connection.host, "db02");
        assert_eq!(settings.connection.user, "backup");
        assert_eq!(settings.connection.port, 5432);
        assert_eq!(settings.require_backup_dir().unwrap(), Path::new("/srv/backups"));
        assert_eq!(
            settings.policy,
            RetentionPolicy {
                min_keep: 4,
                expiry_days: 0,
                max_total_size: 100 * MB,
            }
        );
    }

    #[test]
    fn test_db_name_flag_replaces_selection_block() {
        let file = file_config(
            r#"
            [trim]
            include_dbs = ["crm"]
            include_regex = "sales_"
            include_priority = true
            exclude_dbs = ["tmp"]
            exclude_regex = "test_"
            "#,
        );
        let flags = Overrides {
            db_names: vec!["billing".to_string(), "crm".to_string()],
            ..Default::default()
        };

        let settings = Settings::resolve(&file, &flags).unwrap();

        assert_eq!(settings.criteria.include_names, vec!["billing", "crm"]);
        assert!(settings.criteria.include_regex.is_none());
        assert!(settings.criteria.exclude_names.is_empty());
        assert!(settings.criteria.exclude_regex.is_none());
        assert!(settings.criteria.include_priority);
    }

    #[test]
    fn test_file_selection_block() {
        let file = file_config(
            r#"
            [trim]
            prefix = "nightly_"
            include_regex = "sales_"
            exclude_dbs = []
            "#,
        );

        let settings = Settings::resolve(&file, &Overrides::default()).unwrap();
        assert_eq!(settings.codec.prefix(), "nightly_");
        assert!(settings.criteria.exclude_names.is_empty());
        assert!(settings.criteria.include_regex.unwrap().is_match("sales_eu"));
    }

    #[test]
    fn test_validation_errors() {
        let bad_regex = file_config("[trim]\nexclude_regex = \"(\"");
        assert!(matches!(
            Settings::resolve(&bad_regex, &Overrides::default()),
            Err(ConfigError::InvalidRegex { field: "exclude_regex", .. })
        ));

        let bad_size = Overrides {
            max_size: Some("lots".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Settings::resolve(&AppConfig::default(), &bad_size),
            Err(ConfigError::InvalidSize(_))
        ));
    }

    #[test]
    fn test_summary_marks_disabled_rules() {
        let flags = Overrides {
            expiry_days: Some(0),
            max_size: Some("0".to_string()),
            ..Default::default()
        };
        let settings = Settings::resolve(&AppConfig::default(), &flags).unwrap();
        let summary = settings.summary();

        let value = |key: &str| summary.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
        assert_eq!(value("expiry_days").as_deref(), Some("disabled"));
        assert_eq!(value("max_size").as_deref(), Some("disabled"));
        assert_eq!(value("exclude_dbs").as_deref(), Some("postgres"));
        assert_eq!(value("naming_scheme").as_deref(), Some("v1"));
    }

    #[test]
    fn test_summary_shows_patterns_as_configured() {
        let file = file_config(
            r#"
            [trim]
            include_regex = "sales_(eu|us)"
            exclude_regex = "tmp"
            "#,
        );
        let settings = Settings::resolve(&file, &Overrides::default()).unwrap();
        let summary = settings.summary();

        let value = |key: &str| summary.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
        assert_eq!(value("include_regex").as_deref(), Some("sales_(eu|us)"));
        assert_eq!(value("exclude_regex").as_deref(), Some("tmp"));
        assert_eq!(value("db_owner").as_deref(), Some("-"));
    }
}
