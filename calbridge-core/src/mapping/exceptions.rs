//! Recurrence exceptions: EXDATEs, exception events and master reconstruction.

use std::cmp::Reverse;

use chrono::{Duration, NaiveDate};

use crate::error::{CalBridgeError, CalBridgeResult};
use crate::event::{CalendarEvent, EventTime, local_to_utc};
use crate::host::{HostCalendarItem, HostException, HostRecurrencePattern};
use crate::mapping::MappingContext;
use crate::recurrence::expand_rule;
use crate::rule::{Frequency, RecurrenceRule, RuleEnd};
use crate::timezone::chrono_tz_for;

/// Value identifying the occurrence of `date` in the frame of the master's DTSTART.
pub fn occurrence_time(master_start: &EventTime, item: &HostCalendarItem, date: NaiveDate) -> EventTime {
    let wall = date.and_time(item.start.time());
    match master_start {
        EventTime::Date(_) => EventTime::Date(date),
        EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
            datetime: wall,
            tzid: tzid.clone(),
        },
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(match chrono_tz_for(&item.start_time_zone) {
            Some(tz) => local_to_utc(&tz, &wall),
            None => wall.and_utc(),
        }),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(wall),
    }
}

/// Date of a generated occurrence as seen in the host zone.
pub(crate) fn host_date(time: &EventTime, item: &HostCalendarItem) -> NaiveDate {
    match time {
        EventTime::Date(d) => *d,
        EventTime::DateTimeFloating(dt) => dt.date(),
        _ => match chrono_tz_for(&item.start_time_zone) {
            Some(tz) => time.to_utc().with_timezone(&tz).date_naive(),
            None => time.to_utc().date_naive(),
        },
    }
}

/// Original dates of deleted occurrences that no modified exception claims.
pub fn deleted_dates(pattern: &HostRecurrencePattern) -> Vec<NaiveDate> {
    let claimed: Vec<NaiveDate> = modified(pattern).map(|(date, _)| date).collect();
    let mut dates: Vec<NaiveDate> = pattern
        .exceptions
        .iter()
        .filter(|e| e.deleted && !claimed.contains(&e.original_date))
        .map(|e| e.original_date)
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

/// Modified occurrences keyed by original date.
pub fn modified(
    pattern: &HostRecurrencePattern,
) -> impl Iterator<Item = (NaiveDate, &HostCalendarItem)> {
    pattern.exceptions.iter().filter_map(|e| match e {
        HostException {
            deleted: false,
            item: Some(item),
            original_date,
        } => Some((*original_date, item.as_ref())),
        _ => None,
    })
}

/// Fill the master's EXDATEs from the item's exceptions.
///
/// Besides deleted occurrences, every generated occurrence between a moved
/// exception's original and new date is excluded, unless another modified
/// exception owns it.
pub fn map_exdates_outbound(
    ctx: &MappingContext<'_>,
    item: &HostCalendarItem,
    master: &mut CalendarEvent,
) {
    master.exception_dates.clear();
    let Some(pattern) = &item.recurrence else {
        return;
    };

    let mut dates = deleted_dates(pattern);
    let originals: Vec<NaiveDate> = modified(pattern).map(|(date, _)| date).collect();

    if let Some(rule) = master.recurrence_rules.first() {
        for (original, exception) in modified(pattern) {
            let moved_to = exception.start.date();
            let from = original.min(moved_to);
            let to = original.max(moved_to);

            let range_start = (from - Duration::days(1)).and_time(chrono::NaiveTime::MIN).and_utc();
            let range_end = (to + Duration::days(2)).and_time(chrono::NaiveTime::MIN).and_utc();
            let generated = match expand_rule(&master.start, rule, range_start, range_end) {
                Ok(generated) => generated,
                Err(e) => {
                    ctx.warn_with_cause(
                        &format!("Could not expand series '{}' around {original}", master.uid),
                        &e,
                    );
                    dates.push(original);
                    continue;
                }
            };

            for occurrence in generated {
                let date = host_date(&occurrence, item);
                let owned_by_other = date != original && originals.contains(&date);
                if (from..=to).contains(&date) && !owned_by_other {
                    dates.push(date);
                }
            }
        }
    }

    dates.sort();
    dates.dedup();
    master.exception_dates = dates
        .into_iter()
        .map(|date| occurrence_time(&master.start, item, date))
        .collect();
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

/// `time` moved by `offset`, keeping its kind.
fn shifted(time: &EventTime, offset: Duration) -> EventTime {
    match time {
        EventTime::Date(d) => EventTime::Date(*d + Duration::days(offset.num_days())),
        EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(*dt + offset),
        EventTime::DateTimeFloating(dt) => EventTime::DateTimeFloating(*dt + offset),
        EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
            datetime: *datetime + offset,
            tzid: tzid.clone(),
        },
    }
}

/// Rebuild a daily master from exception events whose master is gone.
///
/// The interval is the greatest common divisor of the day distances between
/// consecutive recurrence ids; slots without an exception become EXDATEs.
/// Returns the master and the exceptions with corrected recurrence ids.
pub fn reconstruct_master(
    events: &[CalendarEvent],
) -> CalBridgeResult<(CalendarEvent, Vec<CalendarEvent>)> {
    let mut exceptions: Vec<CalendarEvent> = events
        .iter()
        .filter(|e| e.recurrence_id.is_some())
        .cloned()
        .collect();
    if exceptions.len() < 2 {
        return Err(CalBridgeError::MasterEventMissing(format!(
            "{} exception event(s) cannot describe a series",
            exceptions.len()
        )));
    }
    exceptions.sort_by_key(|e| e.recurrence_id.as_ref().map(EventTime::to_utc));

    let first = exceptions[0].clone();
    let Some(anchor) = first.recurrence_id.clone() else {
        return Err(CalBridgeError::MasterEventMissing(first.uid));
    };
    let anchor_date = anchor.date();

    let distances: Vec<i64> = exceptions
        .iter()
        .filter_map(|e| e.recurrence_id.as_ref())
        .map(|rid| (rid.date() - anchor_date).num_days())
        .collect();
    let interval = distances
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(0, gcd)
        .max(1);
    let last = distances.last().copied().unwrap_or_default();
    let count = last / interval + 1;

    let mut master = CalendarEvent::new(first.uid.clone(), anchor.clone());
    master.sequence = exceptions.iter().map(|e| e.sequence).max().unwrap_or_default();
    master.summary = first.summary.clone();
    master.location = first.location.clone();
    master.class = first.class;
    master.categories = first.categories.clone();
    master.organizer = first.organizer.clone();
    master.end = first
        .end
        .as_ref()
        .map(|end| shifted(&anchor, end.to_utc() - first.start.to_utc()));
    master.recurrence_rules = vec![RecurrenceRule {
        interval: interval as u32,
        end: RuleEnd::Count(count as u32),
        ..RecurrenceRule::new(Frequency::Daily)
    }];

    for slot in 0..count {
        let distance = slot * interval;
        let slot_time = anchor.with_date(anchor_date + Duration::days(distance));
        let mut matched = false;
        for (exception, _) in exceptions
            .iter_mut()
            .zip(&distances)
            .filter(|(_, d)| **d == distance)
        {
            exception.recurrence_id = Some(slot_time.clone());
            matched = true;
        }
        if !matched {
            master.exception_dates.push(slot_time);
        }
    }

    Ok((master, exceptions))
}

/// Order in which exceptions can be applied without one crossing another.
///
/// Exceptions moved earlier go first, earliest new start first. The rest follow,
/// latest new start first.
pub fn placement_order(exceptions: &[CalendarEvent]) -> Vec<&CalendarEvent> {
    let (mut earlier, mut later): (Vec<&CalendarEvent>, Vec<&CalendarEvent>) =
        exceptions.iter().partition(|e| {
            e.recurrence_id
                .as_ref()
                .is_some_and(|rid| e.start.to_utc() < rid.to_utc())
        });
    earlier.sort_by_key(|e| e.start.to_utc());
    later.sort_by_key(|e| Reverse(e.start.to_utc()));
    earlier.extend(later);
    earlier
}
