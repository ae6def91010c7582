//! RRULE expansion.
//!
//! Generates the occurrence start times of a rule with the `rrule` crate. The
//! mappers use it to convert end dates into counts and to find the
//! occurrences that surround a moved exception.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rrule::RRuleSet;

use crate::error::{CalBridgeError, CalBridgeResult};
use crate::event::{EventTime, local_to_utc};
use crate::rule::{RecurrenceRule, RuleEnd};
use crate::timezone::chrono_tz_for;

/// Upper bound on generated occurrences per expansion.
const MAX_OCCURRENCES: u16 = u16::MAX;

/// Build an iCalendar-format DTSTART + RRULE block for the rrule crate parser.
///
/// Dates and floating times become UTC, and UNTIL is rewritten in UTC because
/// the rrule crate requires it to match DTSTART.
fn build_rrule_string(start: &EventTime, rule: &RecurrenceRule) -> String {
    let zone = start.tzid().and_then(chrono_tz_for);

    let dtstart = match start {
        EventTime::Date(d) => format!("DTSTART:{}T000000Z", d.format("%Y%m%d")),
        EventTime::DateTimeUtc(dt) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::DateTimeFloating(dt) => format!("DTSTART:{}Z", dt.format("%Y%m%dT%H%M%S")),
        EventTime::DateTimeZoned { datetime, .. } => match zone {
            Some(tz) => format!(
                "DTSTART;TZID={}:{}",
                tz.name(),
                datetime.format("%Y%m%dT%H%M%S")
            ),
            None => format!("DTSTART:{}Z", datetime.format("%Y%m%dT%H%M%S")),
        },
    };

    let mut rule = rule.clone();
    rule.interval = rule.interval.max(1);
    if let RuleEnd::Until(until) = &rule.end {
        let until_utc = until_instant(until, zone.as_ref());
        rule.end = RuleEnd::Until(EventTime::DateTimeUtc(until_utc));
    }

    format!("{dtstart}\nRRULE:{rule}")
}

/// UNTIL as an instant. Date-only and floating values are read in the frame of
/// DTSTART, and a date includes its whole day.
fn until_instant(until: &EventTime, zone: Option<&chrono_tz::Tz>) -> DateTime<Utc> {
    let wall = match until {
        EventTime::Date(d) => d.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1),
        EventTime::DateTimeFloating(dt) => *dt,
        EventTime::DateTimeUtc(_) | EventTime::DateTimeZoned { .. } => return until.to_utc(),
    };
    match zone {
        Some(tz) => local_to_utc(tz, &wall),
        None => wall.and_utc(),
    }
}

/// Convert an rrule occurrence datetime back to an EventTime matching the start's variant.
fn occurrence_to_event_time(dt: &DateTime<rrule::Tz>, start: &EventTime) -> EventTime {
    match start {
        EventTime::Date(_) => EventTime::Date(dt.date_naive()),
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(dt.with_timezone(&Utc)),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(dt.naive_utc()),
        EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
            datetime: dt.naive_local(),
            tzid: tzid.clone(),
        },
    }
}

/// Expand `rule` anchored at `start` into occurrence starts within
/// [range_start, range_end], both inclusive.
pub fn expand_rule(
    start: &EventTime,
    rule: &RecurrenceRule,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> CalBridgeResult<Vec<EventTime>> {
    if range_end < range_start {
        return Ok(Vec::new());
    }
    if let RuleEnd::Until(until) = &rule.end {
        let zone = start.tzid().and_then(chrono_tz_for);
        if until_instant(until, zone.as_ref()) < start.to_utc() {
            return Ok(Vec::new());
        }
    }

    let rrule_str = build_rrule_string(start, rule);
    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
        CalBridgeError::Recurrence(format!("Failed to parse RRULE '{}': {}", rule, e))
    })?;

    // Subtract/add 1 second to make the range inclusive (after/before are exclusive).
    let tz: rrule::Tz = Utc.into();
    let after = (range_start - Duration::seconds(1)).with_timezone(&tz);
    let before = (range_end + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);

    Ok(result
        .dates
        .iter()
        .map(|dt| occurrence_to_event_time(dt, start))
        .collect())
}

/// Occurrence dates of an all-day anchored rule between `from` and `to`, inclusive.
pub fn expand_dates(
    anchor: NaiveDate,
    rule: &RecurrenceRule,
    from: NaiveDate,
    to: NaiveDate,
) -> CalBridgeResult<Vec<NaiveDate>> {
    let range_start = from.and_time(NaiveTime::MIN).and_utc();
    let range_end = (to.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1)).and_utc();
    Ok(expand_rule(&EventTime::Date(anchor), rule, range_start, range_end)?
        .iter()
        .map(EventTime::date)
        .collect())
}
