// libs/appointment-cell/src/services/recurrence.rs
use chrono::{Datelike, Days, Months, NaiveDate};

use crate::models::{AppointmentError, RecurrenceFrequency, RecurrenceHorizon, RecurrencePattern};

/// Expands recurrence patterns into concrete dates. Expansion is pure; the
/// booking service validates and persists each date on its own.
pub struct RecurrenceExpander;

/// Largest accepted interval. Anything wider puts the second occurrence
/// years past any booking horizon.
pub const MAX_RECURRENCE_INTERVAL: u32 = 52;

impl RecurrenceExpander {
    pub fn validate_pattern(pattern: &RecurrencePattern) -> Result<(), AppointmentError> {
        if pattern.interval == 0 {
            return Err(AppointmentError::Validation(
                "recurrence interval must be at least 1".to_string(),
            ));
        }
        if pattern.interval > MAX_RECURRENCE_INTERVAL {
            return Err(AppointmentError::Validation(format!(
                "recurrence interval must be at most {}",
                MAX_RECURRENCE_INTERVAL
            )));
        }

        if let Some(days) = &pattern.days_of_week {
            if !matches!(pattern.frequency, RecurrenceFrequency::Weekly | RecurrenceFrequency::Biweekly) {
                return Err(AppointmentError::Validation(
                    "days_of_week is only valid for weekly and biweekly recurrence".to_string(),
                ));
            }
            if days.is_empty() {
                return Err(AppointmentError::Validation("days_of_week must not be empty".to_string()));
            }
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(AppointmentError::Validation(format!(
                    "days_of_week entries must be 0-6, got {}",
                    bad
                )));
            }
        }

        Ok(())
    }

    /// Dates for a series anchored at `start`, which is always the first
    /// occurrence. Stops at the pattern end date, the horizon date or the
    /// occurrence cap, whichever comes first.
    pub fn generate_dates(start: NaiveDate, pattern: &RecurrencePattern, horizon: RecurrenceHorizon) -> Vec<NaiveDate> {
        if horizon.max_occurrences == 0 {
            return Vec::new();
        }

        let until = match pattern.end_date {
            Some(end) => end.min(horizon.until),
            None => horizon.until,
        };
        if start > until {
            return Vec::new();
        }
        let interval = u64::from(pattern.interval.max(1));

        let mut dates = vec![start];
        let push = |date: NaiveDate, dates: &mut Vec<NaiveDate>| -> bool {
            if date > until || dates.len() >= horizon.max_occurrences {
                return false;
            }
            dates.push(date);
            true
        };

        match (pattern.frequency, &pattern.days_of_week) {
            (RecurrenceFrequency::Weekly, Some(days)) | (RecurrenceFrequency::Biweekly, Some(days)) => {
                let week_step = if pattern.frequency == RecurrenceFrequency::Biweekly {
                    2 * interval
                } else {
                    interval
                };
                let mut weekdays = days.clone();
                weekdays.sort_unstable();
                weekdays.dedup();

                let Some(week_start) =
                    start.checked_sub_days(Days::new(u64::from(start.weekday().num_days_from_sunday())))
                else {
                    return dates;
                };
                for week in 0u64.. {
                    let Some(active) = week
                        .checked_mul(week_step)
                        .and_then(|weeks| weeks.checked_mul(7))
                        .and_then(|offset| week_start.checked_add_days(Days::new(offset)))
                    else {
                        break;
                    };
                    if active > until {
                        break;
                    }
                    let mut full = false;
                    for day in &weekdays {
                        let Some(date) = active.checked_add_days(Days::new(u64::from(*day))) else {
                            continue;
                        };
                        if date <= start {
                            continue;
                        }
                        if !push(date, &mut dates) {
                            full = true;
                            break;
                        }
                    }
                    if full {
                        break;
                    }
                }
            }
            (RecurrenceFrequency::Monthly, _) | (RecurrenceFrequency::Quarterly, _) => {
                let multiplier = if pattern.frequency == RecurrenceFrequency::Quarterly { 3 } else { 1 };
                let Some(month_step) = u32::try_from(interval).ok().and_then(|i| i.checked_mul(multiplier)) else {
                    return dates;
                };
                // Always offset from the anchor so a 31st does not drift to
                // the 28th after February.
                for k in 1u32.. {
                    let Some(date) = k
                        .checked_mul(month_step)
                        .and_then(|months| start.checked_add_months(Months::new(months)))
                    else {
                        break;
                    };
                    if !push(date, &mut dates) {
                        break;
                    }
                }
            }
            (frequency, _) => {
                let step_days = match frequency {
                    RecurrenceFrequency::Daily => interval,
                    RecurrenceFrequency::Biweekly => 14 * interval,
                    _ => 7 * interval,
                };
                let mut date = start;
                while let Some(next) = date.checked_add_days(Days::new(step_days)) {
                    if !push(next, &mut dates) {
                        break;
                    }
                    date = next;
                }
            }
        }

        dates
    }
}
