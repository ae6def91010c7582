//! ICS file parsing using the icalendar crate's parser.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{CalBridgeError, CalBridgeResult};
use crate::event::{
    Alarm, AlarmTrigger, Attendee, AttendeeRole, CalendarEvent, CalendarUserType,
    Classification, EventStatus, EventTime, Organizer, ParticipationStatus, Transparency,
    TriggerRelation,
};
use crate::ics::parse_duration;
use crate::logging::{MappingLogger, warn, warn_with_cause};
use crate::rule::RecurrenceRule;

/// Parse every VEVENT of an ICS document.
///
/// VEVENTs without UID or a readable DTSTART are skipped with a warning, as
/// are RRULEs that cannot be read at all.
pub fn parse_events(
    content: &str,
    logger: &dyn MappingLogger,
) -> CalBridgeResult<Vec<CalendarEvent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| CalBridgeError::IcsParse(e.to_string()))?;

    let events = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let event = parse_vevent(vevent, logger);
            if event.is_none() {
                warn(logger, "Skipping VEVENT without UID or DTSTART");
            }
            event
        })
        .collect();

    Ok(events)
}

fn param<'a>(prop: &'a Property, key: &str) -> Option<&'a str> {
    prop.params
        .iter()
        .find(|p| p.key.as_ref().eq_ignore_ascii_case(key))
        .and_then(|p| p.val.as_ref().map(|v| v.as_ref()))
}

fn parse_vevent(vevent: &Component, logger: &dyn MappingLogger) -> Option<CalendarEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let start = to_event_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);

    let mut event = CalendarEvent::new(uid, start);

    event.end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
        .or_else(|| {
            let seconds = parse_duration(vevent.find_prop("DURATION")?.val.as_ref())?;
            Some(shift(&event.start, seconds))
        });

    event.summary = vevent.find_prop("SUMMARY").map(|p| p.val.to_string());
    event.description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    event.location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    event.sequence = vevent
        .find_prop("SEQUENCE")
        .and_then(|p| p.val.as_ref().trim().parse().ok())
        .unwrap_or(0);
    event.priority = vevent
        .find_prop("PRIORITY")
        .and_then(|p| p.val.as_ref().trim().parse().ok());
    event.class = vevent
        .find_prop("CLASS")
        .and_then(|p| Classification::from_ics_str(p.val.as_ref()));

    event.status = vevent
        .find_prop("STATUS")
        .map(|p| match p.val.as_ref().to_ascii_uppercase().as_str() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        })
        .unwrap_or(EventStatus::Confirmed);

    event.transparency = vevent
        .find_prop("TRANSP")
        .map(|p| {
            if p.val.as_ref().eq_ignore_ascii_case("TRANSPARENT") {
                Transparency::Transparent
            } else {
                Transparency::Opaque
            }
        })
        .unwrap_or(Transparency::Opaque);

    event.last_modified = vevent
        .find_prop("LAST-MODIFIED")
        .or_else(|| vevent.find_prop("DTSTAMP"))
        .and_then(|p| parse_utc(p.val.as_ref()));

    event.recurrence_rules = vevent
        .properties
        .iter()
        .filter(|p| p.name == "RRULE")
        .filter_map(|p| match p.val.as_ref().parse::<RecurrenceRule>() {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn_with_cause(
                    logger,
                    &format!("Ignoring unreadable RRULE of event '{}'", event.uid),
                    &e,
                );
                None
            }
        })
        .collect();

    event.exception_dates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    event.recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);

    event.organizer = vevent.find_prop("ORGANIZER").map(parse_organizer);
    event.attendees = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(parse_attendee)
        .collect();

    event.categories = vevent
        .properties
        .iter()
        .filter(|p| p.name == "CATEGORIES")
        .flat_map(|p| {
            p.val
                .as_ref()
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
        })
        .collect();

    event.alarms = vevent
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .filter_map(parse_alarm)
        .collect();

    // Custom X- properties (busy status, notification flags, provider data)
    event.custom_properties = vevent
        .properties
        .iter()
        .filter(|p| p.name.as_ref().to_ascii_uppercase().starts_with("X-"))
        .map(|p| (p.name.to_string(), p.val.to_string()))
        .collect();

    Some(event)
}

fn shift(time: &EventTime, seconds: i64) -> EventTime {
    let delta = Duration::seconds(seconds);
    match time {
        EventTime::Date(d) => EventTime::Date(*d + Duration::days(seconds / 86_400)),
        EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(*dt + delta),
        EventTime::DateTimeFloating(dt) => EventTime::DateTimeFloating(*dt + delta),
        EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
            datetime: *datetime + delta,
            tzid: tzid.clone(),
        },
    }
}

fn parse_utc(value: &str) -> Option<chrono::DateTime<Utc>> {
    let value = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// Parse an EXDATE property into a list of EventTime values.
///
/// Handles TZID, VALUE=DATE, UTC, floating and comma-separated values.
fn parse_exdate_property(prop: &Property) -> Vec<EventTime> {
    let tzid = param(prop, "TZID").map(str::to_string);
    let is_date = param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date || s.len() == 8 {
                NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(EventTime::Date)
            } else if let Some(ref tz) = tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::DateTimeZoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else if s.ends_with('Z') {
                parse_utc(s).map(EventTime::DateTimeUtc)
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(EventTime::DateTimeFloating)
            }
        })
        .collect()
}

/// Mailbox of a cal-address value; None for anything but a non-empty mailto URI.
fn mailbox(value: &str) -> Option<String> {
    let value = value.trim();
    let prefix = value.get(..7)?;
    if !prefix.eq_ignore_ascii_case("mailto:") {
        return None;
    }
    let email = value[7..].trim();
    (!email.is_empty()).then(|| email.to_string())
}

fn is_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("TRUE"))
}

fn is_client_scheduled(prop: &Property) -> bool {
    param(prop, "SCHEDULE-AGENT").is_some_and(|v| v.eq_ignore_ascii_case("CLIENT"))
}

fn parse_organizer(prop: &Property) -> Organizer {
    Organizer {
        email: mailbox(prop.val.as_ref()),
        name: param(prop, "CN").map(str::to_string),
        schedule_agent_client: is_client_scheduled(prop),
    }
}

fn parse_attendee(prop: &Property) -> Attendee {
    Attendee {
        email: mailbox(prop.val.as_ref()),
        name: param(prop, "CN").map(str::to_string),
        partstat: param(prop, "PARTSTAT").and_then(ParticipationStatus::from_ics_str),
        role: param(prop, "ROLE").and_then(AttendeeRole::from_ics_str),
        cutype: param(prop, "CUTYPE").map(CalendarUserType::from_ics_str),
        rsvp: is_true(param(prop, "RSVP")),
        schedule_agent_client: is_client_scheduled(prop),
    }
}

fn parse_alarm(valarm: &Component) -> Option<Alarm> {
    let trigger_prop = valarm.find_prop("TRIGGER")?;
    let value = trigger_prop.val.as_ref();

    let is_date_time = param(trigger_prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE-TIME"));
    let trigger = if is_date_time {
        AlarmTrigger::Absolute(parse_utc(value)?)
    } else {
        let related = match param(trigger_prop, "RELATED") {
            Some(r) if r.eq_ignore_ascii_case("END") => TriggerRelation::End,
            _ => TriggerRelation::Start,
        };
        AlarmTrigger::Relative {
            offset_seconds: parse_duration(value)?,
            related,
        }
    };

    Some(Alarm {
        action: valarm
            .find_prop("ACTION")
            .map(|p| p.val.to_string())
            .unwrap_or_else(|| "DISPLAY".to_string()),
        description: valarm.find_prop("DESCRIPTION").map(|p| p.val.to_string()),
        trigger,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventGroup;
    use crate::ics::generate_ics;
    use crate::logging::{CollectingLogger, NullLogger};
    use crate::rule::{Frequency, RuleEnd};
    use chrono::{TimeZone, Weekday};

    const SERIES: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:series-1\r\n\
SEQUENCE:4\r\n\
SUMMARY:Standup\r\n\
DTSTART;TZID=Europe/Berlin:20250303T090000\r\n\
DURATION:PT30M\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO;COUNT=10\r\n\
EXDATE;TZID=Europe/Berlin:20250310T090000,20250317T090000\r\n\
CATEGORIES:Work,Team\r\n\
CLASS:CONFIDENTIAL\r\n\
PRIORITY:1\r\n\
X-MICROSOFT-CDO-BUSYSTATUS:OOF\r\n\
ORGANIZER;CN=Boss:MAILTO:boss@example.com\r\n\
ATTENDEE;ROLE=OPT-PARTICIPANT;PARTSTAT=DECLINED;RSVP=TRUE:mailto:alice@example.com\r\n\
ATTENDEE;CN=Room 1;CUTYPE=RESOURCE:invalid:nomail\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
DESCRIPTION:Reminder\r\n\
TRIGGER:-PT10M\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:series-1\r\n\
SUMMARY:Standup (moved)\r\n\
RECURRENCE-ID;TZID=Europe/Berlin:20250324T090000\r\n\
DTSTART;TZID=Europe/Berlin:20250325T090000\r\n\
DTEND;TZID=Europe/Berlin:20250325T093000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_series_with_exception() {
        let events = parse_events(SERIES, &NullLogger).unwrap();
        assert_eq!(events.len(), 2);

        let master = &events[0];
        assert!(master.is_master());
        assert_eq!(master.sequence, 4);
        assert_eq!(master.recurrence_rules.len(), 1);
        assert_eq!(master.recurrence_rules[0].frequency, Frequency::Weekly);
        assert_eq!(master.recurrence_rules[0].end, RuleEnd::Count(10));
        assert_eq!(master.recurrence_rules[0].by_day[0].weekday, Weekday::Mon);
        assert_eq!(master.exception_dates.len(), 2);
        assert_eq!(master.categories, vec!["Work", "Team"]);
        assert_eq!(master.class, Some(Classification::Confidential));
        assert_eq!(master.priority, Some(1));
        assert_eq!(master.custom_property("X-MICROSOFT-CDO-BUSYSTATUS"), Some("OOF"));

        // DURATION becomes an explicit end
        assert_eq!(
            master.end,
            Some(EventTime::DateTimeZoned {
                datetime: NaiveDate::from_ymd_opt(2025, 3, 3)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap(),
                tzid: "Europe/Berlin".into(),
            })
        );

        let organizer = master.organizer.as_ref().unwrap();
        assert_eq!(organizer.email.as_deref(), Some("boss@example.com"));
        assert_eq!(organizer.name.as_deref(), Some("Boss"));

        assert_eq!(master.attendees.len(), 2);
        assert_eq!(master.attendees[0].role, Some(AttendeeRole::OptionalParticipant));
        assert_eq!(master.attendees[0].partstat, Some(ParticipationStatus::Declined));
        assert!(master.attendees[0].rsvp);
        assert_eq!(master.attendees[1].email, None);
        assert_eq!(master.attendees[1].cutype, Some(CalendarUserType::Resource));

        assert_eq!(master.alarms.len(), 1);
        assert_eq!(
            master.alarms[0].trigger,
            AlarmTrigger::Relative {
                offset_seconds: -600,
                related: TriggerRelation::Start
            }
        );

        let exception = &events[1];
        assert_eq!(
            exception.recurrence_id.as_ref().map(EventTime::date),
            NaiveDate::from_ymd_opt(2025, 3, 24)
        );
    }

    #[test]
    fn test_parse_skips_vevent_without_uid() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nBEGIN:VEVENT\r\nDTSTART:20250101T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let logger = CollectingLogger::new();
        assert!(parse_events(ics, &logger).unwrap().is_empty());
        assert!(logger.contains("Skipping VEVENT without UID or DTSTART"));
    }

    #[test]
    fn test_parse_drops_rrule_without_freq() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nBEGIN:VEVENT\r\nUID:no-freq\r\nDTSTART:20250101T100000Z\r\nRRULE:INTERVAL=2;BYHOUR=9\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let logger = CollectingLogger::new();
        let events = parse_events(ics, &logger).unwrap();

        assert_eq!(events.len(), 1);
        assert!(events[0].recurrence_rules.is_empty());
        assert_eq!(
            logger.warnings(),
            vec!["Ignoring unreadable RRULE of event 'no-freq': ICS parse error: RRULE without FREQ".to_string()]
        );
    }

    #[test]
    fn test_parse_keeps_rrule_with_unknown_parts() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nBEGIN:VEVENT\r\nUID:by-hour\r\nDTSTART:20250106T090000Z\r\nRRULE:FREQ=WEEKLY;BYDAY=MO;BYHOUR=9\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let logger = CollectingLogger::new();
        let events = parse_events(ics, &logger).unwrap();

        let rule = &events[0].recurrence_rules[0];
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.ignored_parts, vec!["BYHOUR=9"]);
        assert!(logger.is_empty());
    }

    #[test]
    fn test_parse_line_folding_preserves_whitespace() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:test-123\r\n\
SUMMARY:Test\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
DESCRIPTION:Hello \r\n world and \r\n more text\r\n\
END:VEVENT\r\n\
END:VCALENDAR";

        let events = parse_events(ics, &NullLogger).unwrap();
        assert_eq!(
            events[0].description.as_deref(),
            Some("Hello world and more text")
        );
    }

    #[test]
    fn test_generated_group_parses_back() {
        let events = parse_events(SERIES, &NullLogger).unwrap();
        let mut iter = events.into_iter();
        let master = iter.next().unwrap();
        let mut exception = iter.next().unwrap();
        exception.last_modified = Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());

        let group = EventGroup {
            master: master.clone(),
            exceptions: vec![exception.clone()],
            timezones: vec![],
        };
        let ics = generate_ics(&group).unwrap();
        let reparsed = parse_events(&ics, &NullLogger).unwrap();

        assert_eq!(reparsed.len(), 2);
        assert_eq!(reparsed[0].recurrence_rules, master.recurrence_rules);
        assert_eq!(reparsed[0].exception_dates, master.exception_dates);
        assert_eq!(reparsed[0].attendees, master.attendees);
        assert_eq!(reparsed[0].alarms, master.alarms);
        assert_eq!(reparsed[0].categories, master.categories);
        assert_eq!(reparsed[1].recurrence_id, exception.recurrence_id);
        assert_eq!(reparsed[1].start, exception.start);
    }
}
