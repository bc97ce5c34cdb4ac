use std::env;
use std::str::FromStr;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod hhmm;

pub use hhmm::parse_clock_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarBackend {
    Memory,
    Supabase,
}

impl FromStr for CalendarBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in_memory" => Ok(CalendarBackend::Memory),
            "supabase" | "postgrest" => Ok(CalendarBackend::Supabase),
            other => Err(format!("Unknown calendar backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub calendar_backend: CalendarBackend,
    pub port: u16,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_default(),
            calendar_backend: env_or("CALENDAR_BACKEND", CalendarBackend::Memory),
            port: env_or("PORT", 3000),
            scheduling: SchedulingConfig::from_env(),
        };

        if config.calendar_backend == CalendarBackend::Supabase && !config.is_supabase_configured() {
            warn!("Supabase calendar backend selected but Supabase is not fully configured");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }
}

/// A staff member's bookable window. `days` uses 0 = Sunday .. 6 = Saturday;
/// `None` means every day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<u8>>,
}

impl WorkingHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end, days: None }
    }

    pub fn with_days(mut self, days: Vec<u8>) -> Self {
        self.days = Some(days);
        self
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        match &self.days {
            Some(days) => days.contains(&(date.weekday().num_days_from_sunday() as u8)),
            None => true,
        }
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub working_hours: WorkingHours,
    pub slot_granularity_minutes: u32,
    pub default_duration_minutes: u32,
    pub enforce_working_hours: bool,
    pub timezone: FixedOffset,
    pub next_available_days: u32,
    pub max_search_days: u32,
    pub max_occurrences: usize,
    pub recurrence_horizon_days: u32,
    pub min_outcome_notes_length: usize,
    pub min_time_off_reason_length: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            working_hours: WorkingHours::default(),
            slot_granularity_minutes: 30,
            default_duration_minutes: 30,
            enforce_working_hours: false,
            timezone: Utc.fix(),
            next_available_days: 14,
            max_search_days: 90,
            max_occurrences: 52,
            recurrence_horizon_days: 365,
            min_outcome_notes_length: 10,
            min_time_off_reason_length: 10,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let start = env_time("SCHEDULING_DAY_START", defaults.working_hours.start);
        let end = env_time("SCHEDULING_DAY_END", defaults.working_hours.end);
        let working_hours = if start < end {
            WorkingHours::new(start, end)
        } else {
            warn!("SCHEDULING_DAY_START must be before SCHEDULING_DAY_END, using 08:00-18:00");
            defaults.working_hours.clone()
        };

        let timezone = match env::var("SCHEDULING_TIMEZONE") {
            Ok(raw) => parse_utc_offset(&raw).unwrap_or_else(|| {
                warn!("SCHEDULING_TIMEZONE '{}' is not a UTC offset, using UTC", raw);
                defaults.timezone
            }),
            Err(_) => defaults.timezone,
        };

        Self {
            working_hours,
            slot_granularity_minutes: env_or("SCHEDULING_SLOT_GRANULARITY_MINUTES", defaults.slot_granularity_minutes).max(5),
            default_duration_minutes: env_or("SCHEDULING_DEFAULT_DURATION_MINUTES", defaults.default_duration_minutes),
            enforce_working_hours: env_or("SCHEDULING_ENFORCE_WORKING_HOURS", defaults.enforce_working_hours),
            timezone,
            next_available_days: env_or("SCHEDULING_NEXT_AVAILABLE_DAYS", defaults.next_available_days).max(1),
            max_search_days: env_or("SCHEDULING_MAX_SEARCH_DAYS", defaults.max_search_days).max(1),
            max_occurrences: env_or("SCHEDULING_MAX_OCCURRENCES", defaults.max_occurrences).max(1),
            recurrence_horizon_days: env_or("SCHEDULING_RECURRENCE_HORIZON_DAYS", defaults.recurrence_horizon_days).max(1),
            min_outcome_notes_length: env_or("SCHEDULING_MIN_OUTCOME_NOTES", defaults.min_outcome_notes_length),
            min_time_off_reason_length: env_or("SCHEDULING_MIN_TIME_OFF_REASON", defaults.min_time_off_reason_length),
        }
    }
}

/// Parses `UTC`, `Z`, `+HH:MM`, `-HH:MM` or `+HHMM` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("utc") || value.eq_ignore_ascii_case("z") || value.is_empty() {
        return Some(Utc.fix());
    }

    let (sign, rest) = match value.as_bytes()[0] {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_time(key: &str, default: NaiveTime) -> NaiveTime {
    match env::var(key) {
        Ok(raw) => parse_clock_time(&raw).unwrap_or_else(|| {
            warn!("{} has an invalid time '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_utc_offset("-0330").unwrap().local_minus_utc(), -(3 * 3600 + 30 * 60));
        assert!(parse_utc_offset("Asia/Kuala_Lumpur").is_none());
        assert!(parse_utc_offset("+25:00").is_none());
    }

    #[test]
    fn test_working_days() {
        let weekdays = WorkingHours::default().with_days(vec![1, 2, 3, 4, 5]);
        let monday = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();

        assert!(weekdays.is_working_day(monday));
        assert!(!weekdays.is_working_day(sunday));
        assert!(WorkingHours::default().is_working_day(sunday));
    }

    #[test]
    fn test_scheduling_defaults() {
        let config = SchedulingConfig::default();
        assert_eq!(config.slot_granularity_minutes, 30);
        assert_eq!(config.next_available_days, 14);
        assert!(!config.enforce_working_hours);
        assert_eq!(config.timezone.local_minus_utc(), 0);
    }
}
