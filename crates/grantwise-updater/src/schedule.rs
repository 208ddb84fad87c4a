//! Update schedule parsing.
//!
//! Accepted forms are `cron:<minute> <hour> <day> <month> <weekday>`
//! (standard five-field cron, weekday 0 or 7 is Sunday) and
//! `interval:<N><m|h|d>`. Anything else falls back to daily at 00:00 UTC.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

const DAILY: &str = "0 0 0 * * *";
/// Weekly maintenance slot: Sunday 03:00 UTC.
const WEEKLY_CLEANUP: &str = "0 0 3 * * Sun";

#[derive(Debug, Clone)]
pub enum UpdateSchedule {
    Cron {
        /// The expression as configured, for display.
        expression: String,
        schedule: Box<cron::Schedule>,
    },
    Interval(Duration),
}

impl UpdateSchedule {
    pub fn daily() -> Self {
        Self::from_cron("0 0 * * *", DAILY).unwrap_or(Self::Interval(Duration::days(1)))
    }

    pub fn weekly_cleanup() -> Self {
        Self::from_cron("0 3 * * 0", WEEKLY_CLEANUP).unwrap_or(Self::Interval(Duration::weeks(1)))
    }

    fn from_cron(expression: &str, six_field: &str) -> Option<Self> {
        cron::Schedule::from_str(six_field)
            .ok()
            .map(|schedule| Self::Cron {
                expression: expression.to_string(),
                schedule: Box::new(schedule),
            })
    }

    /// Parses a schedule setting. Invalid settings are logged and replaced
    /// by the daily schedule.
    pub fn parse(setting: &str) -> Self {
        let setting = setting.trim();
        if let Some(expr) = setting.strip_prefix("cron:") {
            let expr = expr.trim();
            match to_six_field(expr).and_then(|six| Self::from_cron(expr, &six)) {
                Some(schedule) => schedule,
                None => {
                    tracing::error!(expression = expr, "invalid cron expression, defaulting to daily");
                    Self::daily()
                }
            }
        } else if let Some(interval) = setting.strip_prefix("interval:") {
            match parse_interval(interval.trim()) {
                Some(duration) => Self::Interval(duration),
                None => {
                    tracing::error!(interval, "invalid interval format, defaulting to daily");
                    Self::daily()
                }
            }
        } else {
            tracing::warn!(schedule = setting, "unknown schedule format, defaulting to daily");
            Self::daily()
        }
    }

    /// The first run time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&after).next(),
            Self::Interval(every) => Some(after + *every),
        }
    }
}

impl fmt::Display for UpdateSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron { expression, .. } => write!(f, "cron[{}]", expression),
            Self::Interval(every) => write!(f, "interval[{}s]", every.num_seconds()),
        }
    }
}

fn parse_interval(value: &str) -> Option<Duration> {
    let (unit_start, _) = value.char_indices().last()?;
    let (count, unit) = value.split_at(unit_start);
    let count: i64 = count.parse().ok().filter(|n| *n > 0)?;
    match unit {
        "m" => Some(Duration::minutes(count)),
        "h" => Some(Duration::hours(count)),
        "d" => Some(Duration::days(count)),
        _ => None,
    }
}

/// Converts five-field cron to the seconds-first form the `cron` crate
/// parses, mapping numeric weekdays from 0-7 (Sunday = 0 or 7) to names.
fn to_six_field(expr: &str) -> Option<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let [minute, hour, day, month, weekday] = fields.as_slice() else {
        return None;
    };
    Some(format!(
        "0 {} {} {} {} {}",
        minute,
        hour,
        day,
        month,
        weekday_names(weekday)?
    ))
}

/// Numeric ranges are expanded to explicit name lists: the `cron` crate
/// numbers Sunday first, so a range ending on day 7 would run backwards.
fn weekday_names(field: &str) -> Option<String> {
    const NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    let map_value = |value: &str| -> Option<String> {
        match value.parse::<usize>() {
            Ok(n) => NAMES.get(n).map(|s| s.to_string()),
            Err(_) => Some(value.to_string()),
        }
    };

    let mut parts: Vec<String> = Vec::new();
    let mut push = |part: String| {
        if !parts.contains(&part) {
            parts.push(part);
        }
    };
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        let numeric = range.split_once('-').and_then(|(start, end)| {
            Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?))
        });
        match (numeric, range.split_once('-')) {
            (Some((start, end)), _) => {
                if start > end || end >= NAMES.len() {
                    return None;
                }
                let step = match step {
                    Some(step) => step.parse::<usize>().ok().filter(|s| *s > 0)?,
                    None => 1,
                };
                for n in (start..=end).step_by(step) {
                    push(NAMES[n].to_string());
                }
            }
            (None, Some((start, end))) => {
                let range = format!("{}-{}", map_value(start)?, map_value(end)?);
                push(match step {
                    Some(step) => format!("{}/{}", range, step),
                    None => range,
                });
            }
            (None, None) => {
                let value = map_value(range)?;
                push(match step {
                    Some(step) => format!("{}/{}", value, step),
                    None => value,
                });
            }
        }
    }
    Some(parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn cron_runs_at_configured_time() {
        let schedule = UpdateSchedule::parse("cron:30 6 * * *");
        let next = schedule.next_after(at(2025, 3, 10, 7, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 11, 6, 30));
        assert_eq!(schedule.to_string(), "cron[30 6 * * *]");
    }

    #[test]
    fn numeric_weekdays_follow_cron_convention() {
        // 2025-03-10 is a Monday.
        let sunday = UpdateSchedule::parse("cron:0 3 * * 0");
        let next = sunday.next_after(at(2025, 3, 10, 0, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next.hour(), 3);

        let weekdays = UpdateSchedule::parse("cron:0 9 * * 1-5");
        let next = weekdays.next_after(at(2025, 3, 15, 12, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn weekday_ranges_through_sunday_seven() {
        assert_eq!(weekday_names("1-7").as_deref(), Some("Mon,Tue,Wed,Thu,Fri,Sat,Sun"));
        assert_eq!(weekday_names("0-7").as_deref(), Some("Sun,Mon,Tue,Wed,Thu,Fri,Sat"));
        assert_eq!(weekday_names("0-6/2").as_deref(), Some("Sun,Tue,Thu,Sat"));
        assert_eq!(weekday_names("*").as_deref(), Some("*"));
        assert!(weekday_names("5-1").is_none());

        // 2025-03-15 is a Saturday; 6-7 covers the weekend.
        let weekend = UpdateSchedule::parse("cron:0 10 * * 6-7");
        assert_eq!(weekend.to_string(), "cron[0 10 * * 6-7]");
        let next = weekend.next_after(at(2025, 3, 15, 12, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next.hour(), 10);
    }

    #[test]
    fn intervals() {
        let schedule = UpdateSchedule::parse("interval:90m");
        let start = at(2025, 1, 1, 0, 0);
        assert_eq!(schedule.next_after(start), Some(start + Duration::minutes(90)));
        assert!(matches!(UpdateSchedule::parse("interval:2d"), UpdateSchedule::Interval(d) if d == Duration::days(2)));
        assert!(matches!(UpdateSchedule::parse("interval:12h"), UpdateSchedule::Interval(d) if d == Duration::hours(12)));
    }

    #[test]
    fn invalid_settings_fall_back_to_daily_midnight() {
        for setting in ["cron:* *", "cron:99 99 * * *", "interval:5w", "interval:0h", "hourly", ""] {
            let schedule = UpdateSchedule::parse(setting);
            let next = schedule.next_after(at(2025, 6, 1, 12, 0)).unwrap();
            assert_eq!(next, at(2025, 6, 2, 0, 0), "setting {:?}", setting);
        }
    }

    #[test]
    fn cleanup_runs_sunday_morning() {
        let next = UpdateSchedule::weekly_cleanup()
            .next_after(at(2025, 3, 10, 0, 0))
            .unwrap();
        assert_eq!(next, at(2025, 3, 16, 3, 0));
    }
}
