//! Five-field cron expressions on top of the `cron` crate
//!
//! The `cron` crate expects a leading seconds field and numbers weekdays
//! 1-7 starting on Sunday, while standard crontab syntax has five fields and
//! numbers weekdays 0-7 with both 0 and 7 meaning Sunday.

use crate::scheduler::ScheduleError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// A parsed schedule
///
/// Crontab fires when *either* the day-of-month or the day-of-week field
/// matches if both are restricted, while the `cron` crate requires both.
/// Such expressions are held as two schedules and the earlier firing wins.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedules: Vec<Schedule>,
}

/// Parses a standard five-field cron expression
///
/// Six- and seven-field expressions (with seconds) are passed through unchanged.
///
/// # Examples
///
/// ```
/// use trawler::scheduler::parse_cron;
///
/// assert!(parse_cron("*/15 * * * *").is_ok());
/// assert!(parse_cron("not a schedule").is_err());
/// ```
pub fn parse_cron(expression: &str) -> Result<CronSchedule, ScheduleError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let sources = match fields.len() {
        5 => {
            let (minute, hour, dom, month) = (fields[0], fields[1], fields[2], fields[3]);
            let dow = translate_weekdays(fields[4]);
            let line = |dom: &str, dow: &str| format!("0 {} {} {} {} {}", minute, hour, dom, month, dow);

            if is_restricted(dom) && is_restricted(fields[4]) {
                vec![line(dom, "*"), line("*", &dow)]
            } else {
                vec![line(dom, &dow)]
            }
        }
        6 | 7 => vec![fields.join(" ")],
        n => {
            return Err(ScheduleError::InvalidCron {
                expression: expression.to_string(),
                message: format!("expected 5 fields, got {}", n),
            })
        }
    };

    let schedules = sources
        .iter()
        .map(|source| Schedule::from_str(source))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ScheduleError::InvalidCron {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
    Ok(CronSchedule { schedules })
}

/// First firing strictly after `after`
pub fn next_fire(schedule: &CronSchedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .schedules
        .iter()
        .filter_map(|s| s.after(&after).next())
        .min()
}

/// A day field constrains firings unless it starts with `*` or `?`
fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field.starts_with('?'))
}

/// Maps crontab weekday numbers (0-7, Sunday = 0 or 7) to 1-7 (Sunday = 1)
fn translate_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(translate_weekday_part)
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_weekday_part(part: &str) -> String {
    let (base, step) = match part.split_once('/') {
        Some((b, s)) => (b, Some(s)),
        None => (part, None),
    };
    let with_step = |b: String| match step {
        Some(s) => format!("{}/{}", b, s),
        None => b,
    };

    if let Some((start, end)) = base.split_once('-') {
        let (Ok(start), Ok(end)) = (start.parse::<u8>(), end.parse::<u8>()) else {
            return with_step(base.to_string());
        };
        match step.map(str::parse::<u8>) {
            // Stepped numeric ranges are expanded so Sunday can wrap to 1
            Some(Ok(step)) if step > 0 && start <= end => (start..=end)
                .step_by(usize::from(step))
                .map(|d| shift_weekday(d).to_string())
                .collect::<Vec<_>>()
                .join(","),
            Some(_) => with_step(format!("{}-{}", shift_weekday(start), shift_weekday(end))),
            None if start == 0 && end == 7 => "1-7".to_string(),
            None if end == 7 => format!("{}-7,1", shift_weekday(start)),
            None => format!("{}-{}", shift_weekday(start), shift_weekday(end)),
        }
    } else {
        match base.parse::<u8>() {
            Ok(n) => with_step(shift_weekday(n).to_string()),
            Err(_) => with_step(base.to_string()),
        }
    }
}

fn shift_weekday(n: u8) -> u8 {
    if n >= 7 {
        1
    } else {
        n + 1
    }
}
