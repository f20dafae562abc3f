/// Helper utilities for the pgkeep CLI

use chrono::{DateTime, Utc};

use crate::core::error::ConfigError;

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Parse a size such as `500MB`, `1.5 GB` or `1048576` into bytes.
///
/// Units are binary multiples and case-insensitive. A bare number is a
/// byte count.
pub fn parse_size(value: &str) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let invalid = || ConfigError::InvalidSize(value.to_string());

    let exponent = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "KB" | "K" => 1,
        "MB" | "M" => 2,
        "GB" | "G" => 3,
        "TB" | "T" => 4,
        _ => return Err(invalid()),
    };

    if exponent == 0 {
        return number.parse::<u64>().map_err(|_| invalid());
    }

    let amount: f64 = number.parse().map_err(|_| invalid())?;
    let bytes = amount * 1024f64.powi(exponent);
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(invalid());
    }

    Ok(bytes.round() as u64)
}

/// Age of a backup, rounded down to the hour, e.g. `8days 3h`
pub fn format_age(now: DateTime<Utc>, timestamp: DateTime<Utc>) -> String {
    let secs = (now - timestamp).num_seconds().max(0) as u64;
    let rounded = secs - secs % 3600;

    if rounded == 0 {
        return "<1h".to_string();
    }

    humantime::format_duration(std::time::Duration::from_secs(rounded)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("100MB").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("10000mb").unwrap(), 10_000 * 1024 * 1024);
        assert_eq!(parse_size("1.5 GB").unwrap(), 1536 * 1024 * 1024);
        assert_eq!(parse_size("2T").unwrap(), 2 * 1024u64.pow(4));
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("12 parsecs").is_err());
        assert!(parse_size("1.5").is_err());
        assert!(parse_size("-3GB").is_err());
    }

    #[test]
    fn test_format_age() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        assert_eq!(format_age(now, now - Duration::minutes(20)), "<1h");
        assert_eq!(format_age(now, now - Duration::hours(3) - Duration::minutes(59)), "3h");
        assert_eq!(format_age(now, now - Duration::days(8) - Duration::hours(3)), "8days 3h");
        assert_eq!(format_age(now, now + Duration::hours(5)), "<1h");
    }
}
