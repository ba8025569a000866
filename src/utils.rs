use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

use crate::dates::start_of_day;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "tasklane-dev",
            Profile::Prod => "tasklane",
        }
    }
}

/// Get the configuration directory path
/// If profile is Dev, uses "tasklane-dev" instead of "tasklane"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "tasklane", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "tasklane", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a due date given on the command line.
///
/// Accepts `YYYY-MM-DD` (start of that local day) or `YYYY-MM-DD HH:MM`,
/// both interpreted in `tz`.
pub fn parse_due_date<Tz: TimeZone>(input: &str, tz: &Tz) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(start_of_day(tz, date));
    }
    let local = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M")
        .map_err(|e| format!("Invalid date format '{}': {}", input, e))?;
    tz.from_local_datetime(&local)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| format!("'{}' does not exist in the local time zone", input))
}

/// Render an instant for display in `tz`, as `YYYY-MM-DD HH:MM`.
pub fn format_instant<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn date_only_means_local_midnight() {
        let due = parse_due_date("2026-12-24", &tz()).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2026, 12, 23, 15, 0, 0).unwrap());
    }

    #[test]
    fn date_and_time_are_local() {
        let due = parse_due_date(" 2026-12-24 18:30 ", &tz()).unwrap();
        assert_eq!(format_instant(due, &tz()), "2026-12-24 18:30");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_due_date("next tuesday", &tz()).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_path("~/tasks.db");
        assert!(expanded.ends_with("tasks.db"));
        assert_eq!(expand_path("/abs/tasks.db"), PathBuf::from("/abs/tasks.db"));
    }
}
