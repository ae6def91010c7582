//! Recurrence pattern ⇄ RRULE.

use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::event::{CalendarEvent, EventTime};
use crate::host::{HostCalendarItem, HostRecurrencePattern, NthInstance, PatternKind, PatternRange};
use crate::mapping::MappingContext;
use crate::rule::{Frequency, RecurrenceRule, RuleEnd, WeekdayNum};
use crate::timezone::chrono_tz_for;

const MONTHS: RangeInclusive<i32> = 1..=12;
const MONTH_DAYS: RangeInclusive<i32> = 1..=31;

fn by_day(days: &[Weekday]) -> Vec<WeekdayNum> {
    days.iter().copied().map(WeekdayNum::every).collect()
}

/// Rule equivalent of a host pattern. An end date is kept as UNTIL.
pub fn rule_for_pattern(pattern: &HostRecurrencePattern) -> RecurrenceRule {
    let mut rule = match &pattern.kind {
        PatternKind::Daily => RecurrenceRule::new(Frequency::Daily),
        PatternKind::Weekly { days } => RecurrenceRule {
            by_day: by_day(days),
            ..RecurrenceRule::new(Frequency::Weekly)
        },
        PatternKind::MonthlyByDay { day } => RecurrenceRule {
            by_month_day: vec![*day as i32],
            ..RecurrenceRule::new(Frequency::Monthly)
        },
        PatternKind::MonthlyNth { instance, days } => RecurrenceRule {
            by_day: by_day(days),
            by_set_pos: vec![instance.position()],
            ..RecurrenceRule::new(Frequency::Monthly)
        },
        PatternKind::YearlyByDay { month, day } => RecurrenceRule {
            by_month_day: vec![*day as i32],
            by_month: vec![*month as i32],
            ..RecurrenceRule::new(Frequency::Yearly)
        },
        PatternKind::YearlyNth {
            instance,
            days,
            month,
        } => RecurrenceRule {
            by_day: by_day(days),
            by_set_pos: vec![instance.position()],
            by_month: vec![*month as i32],
            ..RecurrenceRule::new(Frequency::Yearly)
        },
    };

    rule.interval = match pattern.kind {
        PatternKind::YearlyByDay { .. } | PatternKind::YearlyNth { .. } => {
            (pattern.interval / 12).max(1)
        }
        _ => pattern.interval.max(1),
    };

    rule.end = match pattern.range {
        PatternRange::NoEnd => RuleEnd::Forever,
        PatternRange::Occurrences(n) => RuleEnd::Count(n),
        PatternRange::EndDate(d) => RuleEnd::Until(EventTime::Date(d)),
    };

    rule
}

/// Write the item's pattern as the master's RRULE.
///
/// A bounded series is always written with COUNT; an end date is converted by
/// counting the occurrences up to it.
pub fn map_recurrence_outbound(
    ctx: &MappingContext<'_>,
    item: &HostCalendarItem,
    master: &mut CalendarEvent,
) {
    master.recurrence_rules.clear();
    let Some(pattern) = &item.recurrence else {
        return;
    };

    let mut rule = rule_for_pattern(pattern);

    if let PatternKind::YearlyByDay { .. } | PatternKind::YearlyNth { .. } = pattern.kind {
        if pattern.interval % 12 != 0 {
            ctx.warn(&format!(
                "Yearly interval of {} months is not a whole number of years, using {}",
                pattern.interval, rule.interval
            ));
        }
    }

    let subject = item.subject.as_deref().unwrap_or_default();
    retain_valid(ctx, subject, "month", &mut rule.by_month, &MONTHS);
    retain_valid(ctx, subject, "day of month", &mut rule.by_month_day, &MONTH_DAYS);

    if rule.frequency == Frequency::Weekly && rule.by_day.is_empty() {
        rule.by_day = vec![WeekdayNum::every(item.start.weekday())];
    }

    if let PatternRange::EndDate(end) = pattern.range {
        match pattern.occurrence_dates(end) {
            Ok(dates) if !dates.is_empty() => rule.end = RuleEnd::Count(dates.len() as u32),
            Ok(_) => {}
            Err(e) => ctx.warn_with_cause(
                &format!("Could not count occurrences of '{subject}', keeping end date"),
                &e,
            ),
        }
    }

    master.recurrence_rules.push(rule);
}

fn retain_valid(
    ctx: &MappingContext<'_>,
    subject: &str,
    field: &str,
    values: &mut Vec<i32>,
    range: &RangeInclusive<i32>,
) {
    values.retain(|v| {
        let valid = range.contains(v);
        if !valid {
            ctx.warn(&format!(
                "Ignoring invalid {field} {v} in recurrence of '{subject}'"
            ));
        }
        valid
    });
}

/// Replace the item's pattern with the one described by the master's RRULE.
///
/// Unsupported rules clear the pattern and log a warning.
pub fn map_recurrence_inbound(
    ctx: &MappingContext<'_>,
    master: &CalendarEvent,
    item: &mut HostCalendarItem,
) {
    let Some(rule) = master.recurrence_rules.first() else {
        item.clear_recurrence();
        return;
    };
    if master.recurrence_rules.len() > 1 {
        ctx.warn(&format!(
            "Event '{}' has {} recurrence rules, only the first is used",
            master.uid,
            master.recurrence_rules.len()
        ));
    }

    match pattern_for_rule(ctx, rule, item) {
        Some(pattern) => item.set_recurrence(pattern),
        None => item.clear_recurrence(),
    }
}

fn pattern_for_rule(
    ctx: &MappingContext<'_>,
    rule: &RecurrenceRule,
    item: &HostCalendarItem,
) -> Option<HostRecurrencePattern> {
    let start = item.start.date();
    for part in &rule.ignored_parts {
        ctx.warn(&format!(
            "Ignoring unsupported recurrence part {part} of '{}'",
            item.subject.as_deref().unwrap_or_default()
        ));
    }

    let mut interval = rule.interval;
    if interval == 0 {
        ctx.warn("Recurrence interval 0 is invalid, using 1");
        interval = 1;
    }

    let days: Vec<Weekday> = {
        let mut days = Vec::new();
        for d in &rule.by_day {
            if !days.contains(&d.weekday) {
                days.push(d.weekday);
            }
        }
        days
    };

    let kind = match rule.frequency {
        Frequency::Secondly | Frequency::Minutely | Frequency::Hourly => {
            ctx.warn(&format!(
                "Recurrence frequency {} is not supported, recurrence removed",
                rule.frequency.as_ics_str()
            ));
            return None;
        }
        Frequency::Daily if !days.is_empty() => {
            if interval > 1 {
                ctx.warn(&format!(
                    "Daily recurrence with weekdays every {interval} days is not supported, using every week"
                ));
                interval = 1;
            }
            PatternKind::Weekly { days }
        }
        Frequency::Daily => PatternKind::Daily,
        Frequency::Weekly => PatternKind::Weekly {
            days: if days.is_empty() {
                vec![start.weekday()]
            } else {
                days
            },
        },
        Frequency::Monthly if !days.is_empty() => PatternKind::MonthlyNth {
            instance: instance_for(ctx, rule),
            days,
        },
        Frequency::Monthly => PatternKind::MonthlyByDay {
            day: first_valid(ctx, "BYMONTHDAY", &rule.by_month_day, &MONTH_DAYS)
                .unwrap_or(start.day()),
        },
        Frequency::Yearly => {
            let Some(months) = interval.checked_mul(12) else {
                ctx.warn(&format!(
                    "Yearly recurrence interval {interval} is out of range, recurrence removed"
                ));
                return None;
            };
            interval = months;
            let month =
                first_valid(ctx, "BYMONTH", &rule.by_month, &MONTHS).unwrap_or(start.month());
            if days.is_empty() {
                PatternKind::YearlyByDay {
                    month,
                    day: first_valid(ctx, "BYMONTHDAY", &rule.by_month_day, &MONTH_DAYS)
                        .unwrap_or(start.day()),
                }
            } else {
                PatternKind::YearlyNth {
                    instance: instance_for(ctx, rule),
                    days,
                    month,
                }
            }
        }
    };

    let range = match &rule.end {
        RuleEnd::Forever => PatternRange::NoEnd,
        RuleEnd::Count(n) => PatternRange::Occurrences(*n),
        RuleEnd::Until(until) => {
            let end = until_date(until, item);
            if end < start {
                ctx.warn(&format!(
                    "Recurrence end {end} lies before the series start {start}, using the start date"
                ));
                PatternRange::EndDate(start)
            } else {
                PatternRange::EndDate(end)
            }
        }
    };

    Some(HostRecurrencePattern {
        kind,
        interval,
        pattern_start: start,
        range,
        exceptions: Vec::new(),
    })
}

/// UNTIL as a date in the item's start zone.
fn until_date(until: &EventTime, item: &HostCalendarItem) -> NaiveDate {
    match until {
        EventTime::Date(d) => *d,
        EventTime::DateTimeFloating(dt) => dt.date(),
        _ => match chrono_tz_for(&item.start_time_zone) {
            Some(tz) => until.to_utc().with_timezone(&tz).date_naive(),
            None => until.to_utc().date_naive(),
        },
    }
}

fn first_valid(
    ctx: &MappingContext<'_>,
    field: &str,
    values: &[i32],
    range: &RangeInclusive<i32>,
) -> Option<u32> {
    if values.len() > 1 {
        ctx.warn(&format!(
            "Recurrence has several {field} values, only the first is used"
        ));
    }
    let value = *values.first()?;
    if range.contains(&value) {
        Some(value as u32)
    } else {
        ctx.warn(&format!("Ignoring invalid {field} value {value}"));
        None
    }
}

fn instance_for(ctx: &MappingContext<'_>, rule: &RecurrenceRule) -> NthInstance {
    if rule.by_set_pos.len() > 1 {
        ctx.warn("Recurrence has several BYSETPOS values, only the first is used");
    }
    let position = rule
        .by_set_pos
        .first()
        .copied()
        .or_else(|| rule.by_day.iter().find_map(|d| d.ordinal));

    match position {
        Some(1) => NthInstance::First,
        Some(2) => NthInstance::Second,
        Some(3) => NthInstance::Third,
        Some(4) => NthInstance::Fourth,
        Some(-1) | Some(5) => NthInstance::Last,
        Some(n) if n < 0 => {
            ctx.warn(&format!("Recurrence position {n} is not supported, using last"));
            NthInstance::Last
        }
        Some(n) => {
            ctx.warn(&format!("Recurrence position {n} is not supported, using first"));
            NthInstance::First
        }
        None => {
            ctx.warn("Recurrence by weekday has no position, using first");
            NthInstance::First
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfiguration;
    use crate::logging::CollectingLogger;
    use crate::mapping::OwnIdentity;
    use crate::mapping::test_support::{context, timed_item};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn master_for(item: &HostCalendarItem) -> CalendarEvent {
        CalendarEvent::new("uid", EventTime::DateTimeFloating(item.start))
    }

    fn outbound(item: &HostCalendarItem) -> (String, CollectingLogger) {
        let config = MappingConfiguration::default();
        let logger = CollectingLogger::new();
        let identity = OwnIdentity::default();
        let mut master = master_for(item);
        map_recurrence_outbound(&context(&config, &logger, &identity), item, &mut master);
        (master.recurrence_rules[0].to_string(), logger)
    }

    fn inbound(rule: &str, item: &mut HostCalendarItem) -> CollectingLogger {
        let config = MappingConfiguration::default();
        let logger = CollectingLogger::new();
        let identity = OwnIdentity::default();
        let mut master = master_for(item);
        master.recurrence_rules = vec![rule.parse().unwrap()];
        map_recurrence_inbound(&context(&config, &logger, &identity), &master, item);
        logger
    }

    #[test]
    fn test_biweekly_tue_thu_roundtrip() {
        // 2025-03-04 is a Tuesday
        let mut item = timed_item(2025, 3, 4, 10);
        item.set_recurrence(HostRecurrencePattern::new(
            PatternKind::Weekly {
                days: vec![Weekday::Tue, Weekday::Thu],
            },
            2,
            date(2025, 3, 4),
        ));

        let (rule, logger) = outbound(&item);
        assert_eq!(rule, "FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH");
        assert!(logger.is_empty());

        let mut back = timed_item(2025, 3, 4, 10);
        inbound(&rule, &mut back);
        let pattern = back.recurrence.unwrap();
        assert_eq!(pattern.interval, 2);
        assert_eq!(
            pattern.kind,
            PatternKind::Weekly {
                days: vec![Weekday::Tue, Weekday::Thu]
            }
        );
    }

    #[test]
    fn test_last_instance_maps_to_negative_setpos() {
        let mut item = timed_item(2025, 3, 31, 10);
        item.set_recurrence(HostRecurrencePattern::new(
            PatternKind::MonthlyNth {
                instance: NthInstance::Last,
                days: vec![Weekday::Mon],
            },
            1,
            date(2025, 3, 31),
        ));

        let (rule, _) = outbound(&item);
        assert_eq!(rule, "FREQ=MONTHLY;BYDAY=MO;BYSETPOS=-1");

        let mut back = timed_item(2025, 3, 31, 10);
        inbound(&rule, &mut back);
        assert_eq!(
            back.recurrence.unwrap().kind,
            PatternKind::MonthlyNth {
                instance: NthInstance::Last,
                days: vec![Weekday::Mon]
            }
        );
    }

    #[test]
    fn test_yearly_interval_is_months_on_host() {
        let mut item = timed_item(2025, 5, 12, 10);
        item.set_recurrence(HostRecurrencePattern::new(
            PatternKind::YearlyByDay { month: 5, day: 12 },
            24,
            date(2025, 5, 12),
        ));

        let (rule, _) = outbound(&item);
        assert_eq!(rule, "FREQ=YEARLY;INTERVAL=2;BYMONTHDAY=12;BYMONTH=5");

        let mut back = timed_item(2025, 5, 12, 10);
        inbound(&rule, &mut back);
        let pattern = back.recurrence.unwrap();
        assert_eq!(pattern.interval, 24);
        assert_eq!(pattern.kind, PatternKind::YearlyByDay { month: 5, day: 12 });
    }

    #[test]
    fn test_yearly_nth_with_month() {
        let mut item = timed_item(2025, 11, 27, 10);
        item.set_recurrence(HostRecurrencePattern::new(
            PatternKind::YearlyNth {
                instance: NthInstance::Fourth,
                days: vec![Weekday::Thu],
                month: 11,
            },
            12,
            date(2025, 11, 27),
        ));
        let (rule, _) = outbound(&item);
        assert_eq!(rule, "FREQ=YEARLY;BYDAY=TH;BYMONTH=11;BYSETPOS=4");
    }

    #[test]
    fn test_end_date_is_written_as_count() {
        let mut item = timed_item(2025, 3, 3, 10);
        let mut pattern = HostRecurrencePattern::new(PatternKind::Daily, 1, date(2025, 3, 3));
        pattern.range = PatternRange::EndDate(date(2025, 3, 7));
        item.set_recurrence(pattern);

        let (rule, _) = outbound(&item);
        assert_eq!(rule, "FREQ=DAILY;COUNT=5");
    }

    #[test]
    fn test_invalid_day_of_month_is_dropped() {
        let mut item = timed_item(2025, 3, 3, 10);
        item.set_recurrence(HostRecurrencePattern::new(
            PatternKind::MonthlyByDay { day: 40 },
            1,
            date(2025, 3, 3),
        ));
        let (rule, logger) = outbound(&item);
        assert_eq!(rule, "FREQ=MONTHLY");
        assert!(logger.contains("invalid day of month 40"));
    }

    #[test]
    fn test_unsupported_frequency_clears_pattern() {
        let mut item = timed_item(2025, 3, 3, 10);
        item.set_recurrence(HostRecurrencePattern::new(PatternKind::Daily, 1, date(2025, 3, 3)));

        let logger = inbound("FREQ=HOURLY;INTERVAL=4", &mut item);
        assert!(item.recurrence.is_none());
        assert!(logger.contains("HOURLY"));
    }

    #[test]
    fn test_inbound_unknown_parts_keep_the_pattern() {
        let mut item = timed_item(2025, 3, 3, 10);
        let logger = inbound("FREQ=WEEKLY;BYDAY=MO;BYHOUR=9;BYMINUTE=30", &mut item);

        let pattern = item.recurrence.unwrap();
        assert_eq!(pattern.kind, PatternKind::Weekly { days: vec![Weekday::Mon] });
        assert_eq!(
            logger.warnings(),
            vec![
                "Ignoring unsupported recurrence part BYHOUR=9 of 'Planning'".to_string(),
                "Ignoring unsupported recurrence part BYMINUTE=30 of 'Planning'".to_string(),
            ]
        );
    }

    #[test]
    fn test_inbound_yearly_interval_overflow_removes_pattern() {
        let mut item = timed_item(2025, 3, 3, 10);
        item.set_recurrence(HostRecurrencePattern::new(PatternKind::Daily, 1, date(2025, 3, 3)));

        let logger = inbound("FREQ=YEARLY;INTERVAL=400000000", &mut item);
        assert!(item.recurrence.is_none());
        assert!(logger.contains("Yearly recurrence interval 400000000 is out of range"));

        let mut item = timed_item(2025, 3, 3, 10);
        inbound("FREQ=YEARLY;INTERVAL=357913941", &mut item);
        assert_eq!(item.recurrence.unwrap().interval, 357913941 * 12);
    }

    #[test]
    fn test_inbound_invalid_month_falls_back_to_start() {
        let mut item = timed_item(2025, 6, 15, 10);
        let logger = inbound("FREQ=YEARLY;BYMONTH=13;BYMONTHDAY=15", &mut item);
        assert_eq!(
            item.recurrence.unwrap().kind,
            PatternKind::YearlyByDay { month: 6, day: 15 }
        );
        assert!(logger.contains("BYMONTH"));
    }

    #[test]
    fn test_inbound_byday_ordinal_without_setpos() {
        let mut item = timed_item(2025, 3, 12, 10);
        inbound("FREQ=MONTHLY;BYDAY=2WE", &mut item);
        assert_eq!(
            item.recurrence.unwrap().kind,
            PatternKind::MonthlyNth {
                instance: NthInstance::Second,
                days: vec![Weekday::Wed]
            }
        );
    }

    #[test]
    fn test_inbound_count_and_until() {
        let mut item = timed_item(2025, 3, 3, 10);
        inbound("FREQ=DAILY;COUNT=7", &mut item);
        assert_eq!(item.recurrence.unwrap().range, PatternRange::Occurrences(7));

        let mut item = timed_item(2025, 3, 3, 10);
        inbound("FREQ=DAILY;UNTIL=20250310T225959Z", &mut item);
        // 23:59:59 in Berlin
        assert_eq!(
            item.recurrence.unwrap().range,
            PatternRange::EndDate(date(2025, 3, 10))
        );
    }

    #[test]
    fn test_inbound_until_before_start_is_clamped() {
        let mut item = timed_item(2025, 3, 3, 10);
        let logger = inbound("FREQ=DAILY;UNTIL=20250101", &mut item);
        assert_eq!(
            item.recurrence.unwrap().range,
            PatternRange::EndDate(date(2025, 3, 3))
        );
        assert!(logger.contains("before the series start"));
    }

    #[test]
    fn test_inbound_daily_weekdays_becomes_weekly() {
        let mut item = timed_item(2025, 3, 3, 10);
        inbound("FREQ=DAILY;BYDAY=MO,TU,WE,TH,FR", &mut item);
        let pattern = item.recurrence.unwrap();
        assert_eq!(pattern.interval, 1);
        assert!(matches!(pattern.kind, PatternKind::Weekly { ref days } if days.len() == 5));
    }
}
