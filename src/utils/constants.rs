/// Built-in defaults, used when neither a flag nor the config file sets a value

/// Config directory name under the platform config dir
pub const APP_DIR_NAME: &str = "pgkeep";

/// Config file name inside `APP_DIR_NAME`
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_PG_HOST: &str = "localhost";
pub const DEFAULT_PG_USER: &str = "postgres";
pub const DEFAULT_PG_PORT: u16 = 5432;

/// Maintenance database, kept out of routine operations
pub const DEFAULT_EXCLUDED_DBS: &[&str] = &["postgres"];

pub const DEFAULT_EXCLUDE_TEMPLATES: bool = true;

pub const DEFAULT_MIN_BACKUPS: usize = 1;
pub const DEFAULT_EXPIRY_DAYS: u32 = 365;
pub const DEFAULT_MAX_SIZE: &str = "10000MB";

pub const DEFAULT_LOG_LEVEL: &str = "info";
