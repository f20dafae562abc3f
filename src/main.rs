use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pgkeep_cli::cli::{get_version, Cli, Commands, ConfigCommands};
use pgkeep_cli::core::catalog::Catalog;
use pgkeep_cli::core::diff::CatalogDiff;
use pgkeep_cli::core::inventory::{list_backups, Inventory};
use pgkeep_cli::core::retention::{DeletionReason, PruneOutcome, PruneResult};
use pgkeep_cli::core::selector::select_from_catalog;
use pgkeep_cli::core::trimmer::{compare_with_catalog, TrimReport, TrimWarning, Trimmer};
use pgkeep_cli::core::{Overrides, Settings};
use pgkeep_cli::utils::constants::DEFAULT_LOG_LEVEL;
use pgkeep_cli::utils::{format_age, format_bytes, AppConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_config = AppConfig::load(cli.config.as_deref())?;

    init_logging(cli.log_level.as_deref().or(file_config.logging.level.as_deref()))?;
    debug!(version = get_version(), "Starting pgkeep-cli");

    let mut overrides = cli.base_overrides();

    match &cli.command {
        Commands::Trim {
            cluster,
            dry_run,
            json,
            pg_warnings,
            target,
            policy,
            connection,
        } => {
            target.apply(&mut overrides);
            policy.apply(&mut overrides);
            connection.apply(&mut overrides);
            if *pg_warnings {
                overrides.pg_warnings = Some(true);
            }
            let settings = Settings::resolve(&file_config, &overrides)?;
            handle_trim(&settings, *cluster, *dry_run, *json)?;
        }
        Commands::Select {
            json,
            target,
            connection,
        } => {
            target.apply(&mut overrides);
            connection.apply(&mut overrides);
            let settings = Settings::resolve(&file_config, &overrides)?;
            handle_select(&settings, *json)?;
        }
        Commands::Diff {
            json,
            target,
            connection,
        } => {
            target.apply(&mut overrides);
            connection.apply(&mut overrides);
            let settings = Settings::resolve(&file_config, &overrides)?;
            handle_diff(&settings, *json)?;
        }
        Commands::Config { command } => {
            handle_config(command, &file_config, &overrides)?;
        }
    }

    Ok(())
}

/// `--log-level`, then the config file, then `RUST_LOG`, then the default.
fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn handle_trim(settings: &Settings, cluster: bool, dry_run: bool, json: bool) -> Result<()> {
    let dir = settings.require_backup_dir()?;
    let files = list_backups(dir)?;
    let now = Utc::now();

    let trimmer = if dry_run {
        Trimmer::dry_run(settings)
    } else {
        Trimmer::new(settings)
    };

    let report = if cluster {
        trimmer.trim_cluster(files, now)
    } else {
        let psql = settings.connection.catalog();
        let catalog = settings.pg_warnings.then_some(&psql as &dyn Catalog);
        trimmer.trim_databases(files, catalog, now)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_trim_report(&report, now);
    }

    Ok(())
}

fn handle_select(settings: &Settings, json: bool) -> Result<()> {
    let catalog = settings.connection.catalog();
    let selected = select_from_catalog(&catalog, &settings.catalog_filter, &settings.criteria)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    if selected.is_empty() {
        println!("{}", "No databases selected".yellow());
        return Ok(());
    }

    println!("{}\n", "Selected databases".bold());
    println!("{:<4} {:<30} {:<20} {}", "#", "Database", "Owner", "Connectable");
    println!("{}", "-".repeat(70));
    for (i, record) in selected.iter().enumerate() {
        let connectable = if record.connectable { "yes".green() } else { "no".red() };
        println!("{:<4} {:<30} {:<20} {}", i + 1, record.name, record.owner, connectable);
    }

    Ok(())
}

fn handle_diff(settings: &Settings, json: bool) -> Result<()> {
    let dir = settings.require_backup_dir()?;
    let inventory = Inventory::partition(list_backups(dir)?, &settings.codec);
    let catalog = settings.connection.catalog();

    let diff = compare_with_catalog(&catalog, settings, &inventory.backed_up_names())
        .context("Failed to read the database catalog")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        print_catalog_diff(&diff);
    }

    Ok(())
}

fn handle_config(command: &ConfigCommands, file_config: &AppConfig, overrides: &Overrides) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::resolve(file_config, overrides)?;
            println!("{}\n", "Effective configuration".bold());
            for (key, value) in settings.summary() {
                println!("{:<20} {}", key, value);
            }
        }
        ConfigCommands::Path => match AppConfig::config_path() {
            Some(path) => {
                let state = if path.exists() { "exists".green() } else { "not found".yellow() };
                println!("{} ({})", path.display(), state);
            }
            None => println!("{}", "No config directory available on this platform".yellow()),
        },
    }

    Ok(())
}

fn print_trim_report(report: &TrimReport, now: DateTime<Utc>) {
    let title = if report.dry_run {
        "Backup trim (dry run)"
    } else {
        "Backup trim"
    };
    println!("{}\n", title.bold());

    for database in &report.databases {
        print_prune_result(&database.database, &database.result, now);
    }
    if let Some(cluster) = &report.cluster {
        print_prune_result("cluster", cluster, now);
    }

    if !report.warnings.is_empty() {
        println!("{}", "Warnings".yellow().bold());
        for warning in &report.warnings {
            println!("  {} {}", "!".yellow(), describe_warning(warning));
        }
        println!();
    }

    if let Some(diff) = &report.catalog_diff {
        print_catalog_diff(diff);
    }

    let verb = if report.dry_run { "Would remove" } else { "Removed" };
    let summary = format!(
        "{} {} file(s), {} freed",
        verb,
        report.removed,
        format_bytes(report.freed_bytes)
    );
    if report.failed_deletions() > 0 {
        println!("{} ({} failed)", summary.yellow(), report.failed_deletions());
    } else {
        println!("{}", summary.green());
    }
}

fn print_prune_result(name: &str, result: &PruneResult, now: DateTime<Utc>) {
    println!(
        "{}  kept {} ({})",
        name.cyan().bold(),
        result.kept.len(),
        format_bytes(result.kept_bytes())
    );

    if result.outcome == PruneOutcome::PolicyNoop {
        println!("  {}", "retention disabled, nothing to do".dimmed());
    }

    for deletion in &result.deleted {
        let reason = match deletion.reason {
            DeletionReason::Expired { age_days } => format!("expired, {} days old", age_days),
            DeletionReason::OverBudget => "over size budget".to_string(),
        };
        println!(
            "  {} {} ({}, {}, {})",
            "-".red(),
            deletion.file.file_name().unwrap_or("?"),
            format_bytes(deletion.file.size),
            format_age(now, deletion.file.timestamp),
            reason
        );
    }
    println!();
}

fn print_catalog_diff(diff: &CatalogDiff) {
    if diff.is_clean() {
        println!("{}\n", "Every database has a backup".green());
        return;
    }

    for name in &diff.missing_backups {
        println!("  {} {} has no backups", "!".yellow(), name);
    }
    for name in &diff.orphan_backups {
        println!("  {} {} has backups but no longer exists", "?".yellow(), name);
    }
    println!();
}

fn describe_warning(warning: &TrimWarning) -> String {
    match warning {
        TrimWarning::Unparseable { path } => format!("{} does not follow the naming convention", path.display()),
        TrimWarning::DeletionFailed { path, error } => format!("could not delete {}: {}", path.display(), error),
        TrimWarning::NoBackups { database } => format!("no backups found for {}", database),
        TrimWarning::NoTargets => "nothing selected".to_string(),
        TrimWarning::CatalogUnavailable { error } => format!("catalog check skipped: {}", error),
    }
}
