//! Cron evaluation for agent schedules.
//! Accepts the classic 5-field form "MIN HOUR DOM MON DOW" (0 = Sunday)
//! as well as the 6/7-field form with seconds understood by the `cron` crate.
//! Example: "0 9 * * 1-5" = weekdays at 9:00 UTC

use std::str::FromStr;

use cadence_core::error::{CadenceError, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;

/// Computes the next occurrence of a cron expression.
pub trait CronEvaluator: Send + Sync {
    /// First occurrence strictly after `reference`.
    fn next_occurrence(&self, expression: &str, reference: DateTime<Utc>)
    -> Result<DateTime<Utc>>;
}

/// Evaluator backed by the `cron` crate.
pub struct StandardCron;

impl CronEvaluator for StandardCron {
    fn next_occurrence(
        &self,
        expression: &str,
        reference: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        parse(expression)?
            .after(&reference)
            .next()
            .ok_or_else(|| CadenceError::schedule(expression, "no upcoming occurrence"))
    }
}

/// Parse an agent schedule into a `cron::Schedule`.
pub fn parse(expression: &str) -> Result<Schedule> {
    let normalized = normalize(expression)?;
    Schedule::from_str(&normalized).map_err(|e| CadenceError::schedule(expression, e))
}

/// Bring a 5-field expression into the crate's seconds-first form.
fn normalize(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            translate_dow(fields[4])
        )),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(CadenceError::schedule(
            expression,
            format!("expected 5 fields (MIN HOUR DOM MON DOW), got {n}"),
        )),
    }
}

/// Classic cron numbers weekdays 0-7 from Sunday; the `cron` crate wants 1-7.
/// Names sidestep the difference.
fn translate_dow(field: &str) -> String {
    const NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((r, s)) => (r, Some(s)),
                None => (item, None),
            };
            let range = range
                .split('-')
                .map(|part| match part.parse::<usize>() {
                    Ok(n) if n < NAMES.len() => NAMES[n].to_string(),
                    _ => part.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(s) => format!("{range}/{s}"),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_every_hour() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let next = StandardCron.next_occurrence("0 * * * *", after).unwrap();
        assert_eq!(next.hour(), 11);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_backed_off_reference_finds_current_minute() {
        // 09:00:15 minus the 30s tolerance
        let reference = Utc.with_ymd_and_hms(2024, 1, 1, 8, 59, 45).unwrap();
        let next = StandardCron.next_occurrence("0 9 * * *", reference).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_strictly_after_reference() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let next = StandardCron.next_occurrence("0 9 * * *", at).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_every_15_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 0).unwrap();
        let next = StandardCron.next_occurrence("*/15 * * * *", after).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_weekday_range_uses_sunday_zero() {
        // 2024-01-06 is a Saturday
        let after = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let next = StandardCron.next_occurrence("0 9 * * 1-5", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap());

        let sunday = StandardCron.next_occurrence("30 7 * * 0", after).unwrap();
        assert_eq!(sunday, Utc.with_ymd_and_hms(2024, 1, 7, 7, 30, 0).unwrap());
    }

    #[test]
    fn test_six_field_passthrough() {
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = StandardCron.next_occurrence("30 0 12 * * *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 30).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let err = StandardCron
            .next_occurrence("invalid cron", Utc::now())
            .unwrap_err();
        assert!(matches!(err, CadenceError::ScheduleParse { .. }));

        assert!(parse("61 * * * *").is_err());
        assert!(parse("bad").is_err());
    }

    #[test]
    fn test_translate_dow() {
        assert_eq!(translate_dow("1-5"), "Mon-Fri");
        assert_eq!(translate_dow("0,6"), "Sun,Sat");
        assert_eq!(translate_dow("*/2"), "*/2");
        assert_eq!(translate_dow("MON"), "MON");
    }
}
